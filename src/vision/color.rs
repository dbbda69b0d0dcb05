//! Color-space conversion and hue/saturation histograms
//!
//! HSV values follow the 8-bit convention used by most vision toolkits:
//! hue in `[0, 180)`, saturation and value in `[0, 255]`.

use image::{Rgb, RgbImage};

use super::geometry::Rect;

/// Default number of hue bins
pub const HUE_BINS: usize = 50;
/// Default number of saturation bins
pub const SATURATION_BINS: usize = 60;

/// Convert one RGB pixel to 8-bit HSV
pub fn rgb_to_hsv_pixel(pixel: &Rgb<u8>) -> Rgb<u8> {
    let [r, g, b] = pixel.0.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = max - min;

    let s = if max > 0.0 { 255.0 * diff / max } else { 0.0 };

    let mut h = if diff <= 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / diff
    } else if max == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    // 360 degrees folded into 0..180 so it fits a byte
    let h = ((h / 2.0).round() as u32 % 180) as u8;
    Rgb([h, s.round().min(255.0) as u8, max as u8])
}

/// Convert a whole RGB image to HSV (channels stored as h, s, v)
pub fn rgb_to_hsv(image: &RgbImage) -> RgbImage {
    let mut hsv = RgbImage::new(image.width(), image.height());
    for (dst, src) in hsv.pixels_mut().zip(image.pixels()) {
        *dst = rgb_to_hsv_pixel(src);
    }
    hsv
}

/// Normalized 2D hue/saturation histogram
#[derive(Debug, Clone, PartialEq)]
pub struct HsHistogram {
    hue_bins: usize,
    saturation_bins: usize,
    values: Vec<f32>,
}

impl HsHistogram {
    /// Histogram of an RGB region, min-max normalized to `[0, 1]`.
    ///
    /// The region is clipped to the image; an empty region yields an all-zero
    /// histogram.
    pub fn from_region(
        image: &RgbImage,
        region: &Rect,
        hue_bins: usize,
        saturation_bins: usize,
    ) -> Self {
        let hue_bins = hue_bins.max(1);
        let saturation_bins = saturation_bins.max(1);
        let mut values = vec![0.0f32; hue_bins * saturation_bins];

        let clipped = region.clip_to(image.width(), image.height());
        for y in clipped.y..clipped.bottom() {
            for x in clipped.x..clipped.right() {
                let hsv = rgb_to_hsv_pixel(image.get_pixel(x as u32, y as u32));
                let h_bin = (hsv.0[0] as usize * hue_bins / 180).min(hue_bins - 1);
                let s_bin = (hsv.0[1] as usize * saturation_bins / 256).min(saturation_bins - 1);
                values[h_bin * saturation_bins + s_bin] += 1.0;
            }
        }

        normalize_min_max(&mut values);

        Self {
            hue_bins,
            saturation_bins,
            values,
        }
    }

    /// Histogram of the whole image
    pub fn from_image(image: &RgbImage, hue_bins: usize, saturation_bins: usize) -> Self {
        let full = Rect::new(0, 0, image.width() as i32, image.height() as i32);
        Self::from_region(image, &full, hue_bins, saturation_bins)
    }

    pub fn bins(&self) -> (usize, usize) {
        (self.hue_bins, self.saturation_bins)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Bhattacharyya distance in `[0, 1]` (0 = identical distributions)
    pub fn bhattacharyya_distance(&self, other: &HsHistogram) -> f64 {
        if self.values.len() != other.values.len() {
            return 1.0;
        }

        let mut sum_a = 0.0f64;
        let mut sum_b = 0.0f64;
        let mut overlap = 0.0f64;
        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (a as f64, b as f64);
            sum_a += a;
            sum_b += b;
            overlap += (a * b).sqrt();
        }

        let norm = sum_a * sum_b;
        let scale = if norm.abs() > f64::EPSILON {
            1.0 / norm.sqrt()
        } else {
            1.0
        };

        (1.0 - overlap * scale).max(0.0).sqrt()
    }

    /// Similarity score in `[0, 1]` (1 = identical distributions)
    pub fn similarity(&self, other: &HsHistogram) -> f64 {
        (1.0 - self.bhattacharyya_distance(other)).clamp(0.0, 1.0)
    }
}

/// Rescale values so the minimum maps to 0 and the maximum to 1
fn normalize_min_max(values: &mut [f32]) {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range <= f32::EPSILON {
        values.iter_mut().for_each(|v| *v = 0.0);
        return;
    }

    for v in values.iter_mut() {
        *v = (*v - min) / range;
    }
}
