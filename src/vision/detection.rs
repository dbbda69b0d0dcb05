//! Template matching with a position-cache fast path
//!
//! Searches a reference image inside the current frame with the normalized
//! correlation coefficient computed over the HSV channels. When the position
//! cache holds an entry for the label, the search is skipped and the cached
//! region is verified with a hue/saturation histogram comparison instead.

use image::RgbImage;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

use super::cache::{CacheEntry, PositionCache};
use super::color::{rgb_to_hsv, HsHistogram};
use super::geometry::Rect;
use super::templates::TemplateStore;
use super::{AlgorithmKind, MatchResult};

/// Configuration for template matching
#[derive(Debug, Clone)]
pub struct TemplateMatchConfig {
    /// Factor applied to returned rectangles via `Rect::center_zoom`
    pub center_zoom: f64,
    /// Hue bins of the verification histogram
    pub hue_bins: usize,
    /// Saturation bins of the verification histogram
    pub saturation_bins: usize,
}

impl Default for TemplateMatchConfig {
    fn default() -> Self {
        Self {
            center_zoom: 0.8,
            hue_bins: super::color::HUE_BINS,
            saturation_bins: super::color::SATURATION_BINS,
        }
    }
}

/// Best placement found by a correlation search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Correlation coefficient in `[-1, 1]`
    pub score: f64,
    /// Top-left corner of the placement
    pub position: (u32, u32),
}

/// Template matcher for locating registered templates in a frame
#[derive(Debug, Clone, Default)]
pub struct TemplateMatcher {
    config: TemplateMatchConfig,
}

impl TemplateMatcher {
    pub fn new(config: TemplateMatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TemplateMatchConfig {
        &self.config
    }

    /// Locate `label` in `frame`.
    ///
    /// Returns `JustReturn` for unregistered labels, `CompareHist` when the
    /// cached position was re-verified, `MatchTemplate` after a full search.
    /// A full-search score at or above `confirm_threshold` populates the cache
    /// when it is enabled.
    pub fn locate(
        &self,
        frame: &RgbImage,
        templates: &TemplateStore,
        cache: &PositionCache,
        label: &str,
        confirm_threshold: f64,
    ) -> MatchResult {
        let Some(template) = templates.lookup(label) else {
            debug!("Template '{}' is not registered", label);
            return MatchResult::just_return();
        };

        if let Some(entry) = cache.get(label) {
            let region = HsHistogram::from_region(
                frame,
                &entry.rect,
                self.config.hue_bins,
                self.config.saturation_bins,
            );
            let score = region.similarity(&entry.histogram);
            debug!("Cache hit for '{}' at {}: score {:.3}", label, entry.rect, score);
            return MatchResult {
                kind: AlgorithmKind::CompareHist,
                score,
                rect: entry.rect.center_zoom(self.config.center_zoom),
            };
        }

        let start = Instant::now();
        let Some(peak) = search_template(frame, template.image()) else {
            debug!(
                "Template '{}' ({}x{}) does not fit in {}x{} frame",
                label,
                template.width(),
                template.height(),
                frame.width(),
                frame.height()
            );
            return MatchResult {
                kind: AlgorithmKind::MatchTemplate,
                score: 0.0,
                rect: Rect::default(),
            };
        };

        let raw_rect = Rect::new(
            peak.position.0 as i32,
            peak.position.1 as i32,
            template.width() as i32,
            template.height() as i32,
        );
        let score = peak.score.clamp(0.0, 1.0);

        debug!(
            "Template '{}' best at {} score {:.3} in {:?}",
            label,
            raw_rect,
            score,
            start.elapsed()
        );

        if score >= confirm_threshold {
            cache.put_with(label, || CacheEntry {
                rect: raw_rect,
                histogram: HsHistogram::from_region(
                    frame,
                    &raw_rect,
                    self.config.hue_bins,
                    self.config.saturation_bins,
                ),
            });
        }

        MatchResult {
            kind: AlgorithmKind::MatchTemplate,
            score,
            rect: raw_rect.center_zoom(self.config.center_zoom),
        }
    }
}

/// Search `template` inside `frame` (both RGB) in HSV space.
///
/// Returns `None` when the template does not fit inside the frame.
pub fn search_template(frame: &RgbImage, template: &RgbImage) -> Option<CorrelationPeak> {
    let frame_hsv = rgb_to_hsv(frame);
    let template_hsv = rgb_to_hsv(template);
    best_placement(&frame_hsv, &template_hsv)
}

/// Maximum of the correlation map; ties resolve to the first placement in
/// row-major order.
pub fn best_placement(image: &RgbImage, template: &RgbImage) -> Option<CorrelationPeak> {
    let (map_w, _) = map_size(image, template)?;
    let scores = correlation_map(image, template)?;

    let mut best = CorrelationPeak {
        score: f64::NEG_INFINITY,
        position: (0, 0),
    };
    for (idx, &score) in scores.iter().enumerate() {
        if score > best.score {
            best = CorrelationPeak {
                score,
                position: ((idx % map_w) as u32, (idx / map_w) as u32),
            };
        }
    }
    Some(best)
}

fn map_size(image: &RgbImage, template: &RgbImage) -> Option<(usize, usize)> {
    let (img_w, img_h) = image.dimensions();
    let (tmpl_w, tmpl_h) = template.dimensions();
    if tmpl_w == 0 || tmpl_h == 0 || tmpl_w > img_w || tmpl_h > img_h {
        return None;
    }
    Some(((img_w - tmpl_w + 1) as usize, (img_h - tmpl_h + 1) as usize))
}

/// Per-channel integral images of values and squared values
struct Integrals {
    stride: usize,
    sums: [Vec<u64>; 3],
    squares: [Vec<u64>; 3],
}

impl Integrals {
    fn new(image: &RgbImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums: [Vec<u64>; 3] = std::array::from_fn(|_| vec![0u64; stride * (h + 1)]);
        let mut squares: [Vec<u64>; 3] = std::array::from_fn(|_| vec![0u64; stride * (h + 1)]);
        let raw = image.as_raw();

        for y in 0..h {
            let mut row_sum = [0u64; 3];
            let mut row_sq = [0u64; 3];
            for x in 0..w {
                for c in 0..3 {
                    let v = raw[(y * w + x) * 3 + c] as u64;
                    row_sum[c] += v;
                    row_sq[c] += v * v;
                    let idx = (y + 1) * stride + x + 1;
                    sums[c][idx] = sums[c][idx - stride] + row_sum[c];
                    squares[c][idx] = squares[c][idx - stride] + row_sq[c];
                }
            }
        }

        Self {
            stride,
            sums,
            squares,
        }
    }

    fn window(table: &[u64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let a = table[y * stride + x];
        let b = table[y * stride + x + w];
        let c = table[(y + h) * stride + x];
        let d = table[(y + h) * stride + x + w];
        d + a - b - c
    }

    /// Sum over channels of `n * sum(v^2) - sum(v)^2` for one window
    fn scaled_variance(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let n = (w * h) as u128;
        (0..3)
            .map(|c| {
                let s = Self::window(&self.sums[c], self.stride, x, y, w, h) as u128;
                let sq = Self::window(&self.squares[c], self.stride, x, y, w, h) as u128;
                (n * sq - s * s) as f64
            })
            .sum()
    }
}

/// Normalized correlation coefficient of `template` at every placement.
///
/// Each channel is mean-centered separately and the three channels are
/// summed, matching the usual multi-channel `CCOEFF_NORMED` definition.
fn correlation_map(image: &RgbImage, template: &RgbImage) -> Option<Vec<f64>> {
    let (map_w, map_h) = map_size(image, template)?;
    let img_w = image.width() as usize;
    let (tmpl_w, tmpl_h) = (template.width() as usize, template.height() as usize);
    let n = (tmpl_w * tmpl_h) as f64;

    // Mean-centered template, same interleaved layout as the image
    let tmpl_raw = template.as_raw();
    let mut means = [0.0f64; 3];
    for px in tmpl_raw.chunks_exact(3) {
        for c in 0..3 {
            means[c] += px[c] as f64;
        }
    }
    means.iter_mut().for_each(|m| *m /= n);
    let centered: Vec<f64> = tmpl_raw
        .iter()
        .enumerate()
        .map(|(i, &v)| v as f64 - means[i % 3])
        .collect();
    let template_energy: f64 = centered.iter().map(|v| v * v).sum();

    let integrals = Integrals::new(image);
    let img_raw = image.as_raw();
    let row_len = tmpl_w * 3;

    let mut scores = vec![0.0f64; map_w * map_h];
    scores
        .par_chunks_mut(map_w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let mut numerator = 0.0f64;
                for ty in 0..tmpl_h {
                    let img_off = ((y + ty) * img_w + x) * 3;
                    let img_row = &img_raw[img_off..img_off + row_len];
                    let tmpl_row = &centered[ty * row_len..(ty + 1) * row_len];
                    numerator += img_row
                        .iter()
                        .zip(tmpl_row)
                        .map(|(&i, &t)| i as f64 * t)
                        .sum::<f64>();
                }

                let window_energy = integrals.scaled_variance(x, y, tmpl_w, tmpl_h) / n;
                let denominator = (window_energy * template_energy).sqrt();
                *out = if denominator > f64::EPSILON {
                    (numerator / denominator).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
            }
        });

    Some(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Colorful pattern that never repeats inside a 60x40 window
    fn scene(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 7 + y * 3) % 256) as u8,
                ((x * x + y * 11) % 200) as u8 + 30,
                ((y * y * 5 + x * 13) % 256) as u8,
            ])
        })
    }

    fn crop(image: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> RgbImage {
        image::imageops::crop_imm(image, x, y, w, h).to_image()
    }

    fn store_with(label: &str, image: RgbImage) -> TemplateStore {
        let mut store = TemplateStore::new();
        store.register_image(label, image);
        store
    }

    #[test]
    fn test_exact_placement_found() {
        let frame = scene(120, 90);
        let template = crop(&frame, 37, 21, 30, 20);

        let peak = search_template(&frame, &template).unwrap();
        assert_eq!(peak.position, (37, 21));
        assert!(peak.score > 0.99, "score {}", peak.score);
    }

    #[test]
    fn test_template_larger_than_frame() {
        let frame = scene(10, 10);
        let template = scene(20, 5);
        assert!(search_template(&frame, &template).is_none());
    }

    #[test]
    fn test_locate_unregistered_just_returns() {
        let matcher = TemplateMatcher::default();
        let cache = PositionCache::new();
        let store = TemplateStore::new();

        for frame in [scene(50, 50), RgbImage::new(3, 3)] {
            let result = matcher.locate(&frame, &store, &cache, "nothing", 0.8);
            assert_eq!(result.kind, AlgorithmKind::JustReturn);
            assert_eq!(result.score, 0.0);
            assert_eq!(result.rect, Rect::default());
        }
    }

    #[test]
    fn test_locate_match_template_zooms_rect() {
        let frame = scene(120, 90);
        let store = store_with("button", crop(&frame, 50, 40, 40, 20));
        let matcher = TemplateMatcher::default();
        let cache = PositionCache::new();

        let result = matcher.locate(&frame, &store, &cache, "button", 0.8);
        let raw = Rect::new(50, 40, 40, 20);

        assert_eq!(result.kind, AlgorithmKind::MatchTemplate);
        assert!(result.score >= 0.95, "score {}", result.score);
        assert_eq!(result.rect, raw.center_zoom(0.8));
        assert!(raw.contains(&result.rect));
        assert!(result.rect.width < raw.width && result.rect.height < raw.height);
        assert!(cache.is_empty(), "disabled cache must stay empty");
    }

    #[test]
    fn test_cache_hit_compares_histogram() {
        let frame = scene(120, 90);
        let store = store_with("button", crop(&frame, 50, 40, 40, 20));
        let matcher = TemplateMatcher::default();
        let cache = PositionCache::new();
        cache.set_enabled(true);

        let first = matcher.locate(&frame, &store, &cache, "button", 0.8);
        assert_eq!(first.kind, AlgorithmKind::MatchTemplate);
        assert_eq!(cache.len(), 1);

        let second = matcher.locate(&frame, &store, &cache, "button", 0.8);
        assert_eq!(second.kind, AlgorithmKind::CompareHist);
        assert!(second.score >= 0.95, "score {}", second.score);
        assert_eq!(second.rect, first.rect);
    }

    #[test]
    fn test_low_score_not_cached() {
        let frame = scene(120, 90);
        let store = store_with("button", crop(&frame, 50, 40, 40, 20));
        let matcher = TemplateMatcher::default();
        let cache = PositionCache::new();
        cache.set_enabled(true);

        // Threshold above any achievable score
        matcher.locate(&frame, &store, &cache, "button", 1.5);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disable_cache_forces_full_search() {
        let frame = scene(120, 90);
        let store = store_with("button", crop(&frame, 50, 40, 40, 20));
        let matcher = TemplateMatcher::default();
        let cache = PositionCache::new();
        cache.set_enabled(true);
        matcher.locate(&frame, &store, &cache, "button", 0.8);

        cache.set_enabled(false);
        cache.set_enabled(true);

        let result = matcher.locate(&frame, &store, &cache, "button", 0.8);
        assert_eq!(result.kind, AlgorithmKind::MatchTemplate);
    }

    #[test]
    fn test_constant_window_scores_zero() {
        let image = RgbImage::from_pixel(10, 10, Rgb([50, 50, 50]));
        let template = RgbImage::from_fn(3, 3, |x, _| Rgb([x as u8 * 40, 0, 0]));
        let peak = best_placement(&image, &template).unwrap();
        assert_eq!(peak.score, 0.0);
        assert_eq!(peak.position, (0, 0));
    }
}
