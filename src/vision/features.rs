//! Keypoint/descriptor extraction and the feature store
//!
//! Keypoints are FAST-9 corners (imageproc) thinned by non-maximum
//! suppression; descriptors are 256-bit BRIEF tests sampled on a smoothed
//! copy of the image with a fixed, seeded test pattern so that descriptors of
//! the reference and of the scene are comparable.

use image::{GrayImage, RgbImage};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::error::Result;
use super::templates::load_rgb;

/// Half size of the square patch sampled by the BRIEF tests
const PATCH_RADIUS: i32 = 12;
/// Radius of the non-maximum suppression around a kept corner
const NMS_RADIUS: i32 = 3;
/// Number of binary tests per descriptor
const DESCRIPTOR_BITS: usize = 256;

/// 256-bit binary descriptor
pub type Descriptor = [u8; DESCRIPTOR_BITS / 8];

/// Detected keypoint in image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Corner strength reported by the detector
    pub response: f32,
}

/// Keypoints with one descriptor per keypoint, in the same order
#[derive(Debug, Clone, Default)]
pub struct FeatureDescriptorSet {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
}

impl FeatureDescriptorSet {
    /// Pair keypoints with descriptors; extra entries on either side are dropped
    pub fn new(mut keypoints: Vec<Keypoint>, mut descriptors: Vec<Descriptor>) -> Self {
        let len = keypoints.len().min(descriptors.len());
        keypoints.truncate(len);
        descriptors.truncate(len);
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Configuration for keypoint extraction
#[derive(Debug, Clone)]
pub struct FeatureExtractorConfig {
    /// FAST intensity threshold (detection strength)
    pub fast_threshold: u8,
    /// Keep at most this many keypoints, strongest first
    pub max_keypoints: usize,
    /// Gaussian sigma applied before sampling descriptors
    pub blur_sigma: f32,
    /// Seed of the BRIEF test pattern
    pub pattern_seed: u64,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            fast_threshold: 20,
            max_keypoints: 500,
            blur_sigma: 2.0,
            pattern_seed: 0x5eed_b41e,
        }
    }
}

/// FAST + BRIEF extractor
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: FeatureExtractorConfig,
    pattern: Vec<(i32, i32, i32, i32)>,
}

impl FeatureExtractor {
    pub fn new(config: FeatureExtractorConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.pattern_seed);
        let pattern = (0..DESCRIPTOR_BITS)
            .map(|_| {
                (
                    rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                    rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                    rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                    rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                )
            })
            .collect();
        Self { config, pattern }
    }

    pub fn config(&self) -> &FeatureExtractorConfig {
        &self.config
    }

    /// Extract features from a color image (converted to intensity first)
    pub fn extract_rgb(&self, image: &RgbImage) -> FeatureDescriptorSet {
        self.extract(&image::imageops::grayscale(image))
    }

    /// Extract features from an intensity image
    pub fn extract(&self, image: &GrayImage) -> FeatureDescriptorSet {
        let (width, height) = (image.width() as i32, image.height() as i32);
        if width <= 2 * PATCH_RADIUS || height <= 2 * PATCH_RADIUS {
            return FeatureDescriptorSet::default();
        }

        let keypoints = self.detect(image);
        if keypoints.is_empty() {
            return FeatureDescriptorSet::default();
        }

        let smoothed = gaussian_blur_f32(image, self.config.blur_sigma);
        let descriptors = keypoints
            .iter()
            .map(|kp| self.describe(&smoothed, kp))
            .collect();

        debug!(
            "Extracted {} keypoints from {}x{} image",
            keypoints.len(),
            width,
            height
        );
        FeatureDescriptorSet::new(keypoints, descriptors)
    }

    /// FAST corners away from the border, strongest first, non-max suppressed
    fn detect(&self, image: &GrayImage) -> Vec<Keypoint> {
        let (width, height) = (image.width() as i32, image.height() as i32);

        let mut corners: Vec<_> = corners_fast9(image, self.config.fast_threshold)
            .into_iter()
            .filter(|c| {
                let (x, y) = (c.x as i32, c.y as i32);
                x >= PATCH_RADIUS
                    && y >= PATCH_RADIUS
                    && x < width - PATCH_RADIUS
                    && y < height - PATCH_RADIUS
            })
            .collect();

        corners.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        let mut suppressed = vec![false; (width * height) as usize];
        let mut keypoints = Vec::new();
        for corner in corners {
            let (cx, cy) = (corner.x as i32, corner.y as i32);
            if suppressed[(cy * width + cx) as usize] {
                continue;
            }
            for y in (cy - NMS_RADIUS).max(0)..=(cy + NMS_RADIUS).min(height - 1) {
                for x in (cx - NMS_RADIUS).max(0)..=(cx + NMS_RADIUS).min(width - 1) {
                    suppressed[(y * width + x) as usize] = true;
                }
            }
            keypoints.push(Keypoint {
                x: corner.x as f32,
                y: corner.y as f32,
                response: corner.score,
            });
            if keypoints.len() >= self.config.max_keypoints {
                break;
            }
        }

        keypoints
    }

    fn describe(&self, smoothed: &GrayImage, keypoint: &Keypoint) -> Descriptor {
        let mut descriptor = [0u8; DESCRIPTOR_BITS / 8];
        let (kx, ky) = (keypoint.x as i32, keypoint.y as i32);
        let max_x = smoothed.width() as i32 - 1;
        let max_y = smoothed.height() as i32 - 1;

        let sample = |dx: i32, dy: i32| {
            let x = (kx + dx).clamp(0, max_x) as u32;
            let y = (ky + dy).clamp(0, max_y) as u32;
            smoothed.get_pixel(x, y).0[0]
        };

        for (bit, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
            if sample(x1, y1) < sample(x2, y2) {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }

        descriptor
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureExtractorConfig::default())
    }
}

/// Registry of precomputed descriptor sets keyed by label
#[derive(Debug, Default)]
pub struct FeatureStore {
    features: HashMap<String, FeatureDescriptorSet>,
}

impl FeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path`, extract its features and store them under `label`
    pub fn register(&mut self, label: &str, path: &Path, extractor: &FeatureExtractor) -> Result<()> {
        let image = load_rgb(path)?;
        self.register_image(label, &image, extractor);
        Ok(())
    }

    /// Extract features from an already decoded image and store them
    pub fn register_image(&mut self, label: &str, image: &RgbImage, extractor: &FeatureExtractor) {
        let set = extractor.extract_rgb(image);
        info!("Added feature set '{}' ({} keypoints)", label, set.len());
        self.features.insert(label.to_string(), set);
    }

    /// Store a precomputed descriptor set
    pub fn insert(&mut self, label: &str, set: FeatureDescriptorSet) {
        self.features.insert(label.to_string(), set);
    }

    pub fn get(&self, label: &str) -> Option<&FeatureDescriptorSet> {
        self.features.get(label)
    }

    /// All entries; iteration order is unspecified
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureDescriptorSet)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
