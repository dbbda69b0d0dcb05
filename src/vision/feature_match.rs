//! Feature-based element location
//!
//! A reference descriptor set is matched against the scene with nearest
//! Hamming neighbours, then filtered in stages:
//! 1. distance pruning relative to the worst match
//! 2. RANSAC over the fundamental matrix
//! 3. centroid filter against stray inliers
//! 4. acceptance ratio against the reference keypoint count
//!
//! The surviving scene points span the reported rectangle. Single-label and
//! scan-all lookups run the same pipeline with different parameters.

use rayon::prelude::*;
use tracing::{debug, trace};

use super::features::{Descriptor, FeatureDescriptorSet, FeatureStore};
use super::geometry::Rect;
use super::ransac::{fundamental_inliers, RansacConfig};
use super::TextArea;

/// Nearest scene descriptor for one reference descriptor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub query_idx: usize,
    pub scene_idx: usize,
    pub distance: f32,
}

/// Tunables of the filter pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFilterParams {
    /// Keep matches strictly closer than this fraction of the worst distance
    pub ratio_threshold: f32,
    /// Max per-axis distance from the inlier centroid, in pixels
    pub centroid_distance: f32,
    /// Minimum surviving points as a fraction of reference keypoints
    pub acceptance_ratio: f64,
}

impl FeatureFilterParams {
    /// Parameters for locating one named element
    pub fn single() -> Self {
        Self {
            ratio_threshold: 0.4,
            centroid_distance: 200.0,
            acceptance_ratio: 0.075,
        }
    }

    /// Parameters for scanning every registered element
    pub fn scan_all() -> Self {
        Self {
            centroid_distance: 300.0,
            ..Self::single()
        }
    }
}

impl Default for FeatureFilterParams {
    fn default() -> Self {
        Self::single()
    }
}

/// Number of differing bits between two descriptors
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force nearest neighbour in `scene` for every descriptor of `query`.
///
/// Ties resolve to the lowest scene index. Empty on either side yields no
/// correspondences.
pub fn match_descriptors(query: &[Descriptor], scene: &[Descriptor]) -> Vec<Correspondence> {
    if scene.is_empty() {
        return Vec::new();
    }

    query
        .par_iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            scene
                .iter()
                .enumerate()
                .map(|(scene_idx, s)| (scene_idx, hamming_distance(q, s)))
                .min_by_key(|&(idx, dist)| (dist, idx))
                .map(|(scene_idx, dist)| Correspondence {
                    query_idx,
                    scene_idx,
                    distance: dist as f32,
                })
        })
        .collect()
}

/// Keep correspondences with distance strictly below `ratio` times the
/// largest distance among them
pub fn ratio_prune(matches: &[Correspondence], ratio: f32) -> Vec<Correspondence> {
    let max_distance = matches.iter().map(|m| m.distance).fold(0.0f32, f32::max);
    let limit = ratio * max_distance;
    matches
        .iter()
        .filter(|m| m.distance < limit)
        .copied()
        .collect()
}

/// Drop points whose x or y is `max_distance` or more away from the mean
pub fn centroid_filter(points: &[(f32, f32)], max_distance: f32) -> Vec<(f32, f32)> {
    if points.is_empty() {
        return Vec::new();
    }

    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;

    points
        .iter()
        .filter(|p| (p.0 - cx).abs() < max_distance && (p.1 - cy).abs() < max_distance)
        .copied()
        .collect()
}

/// `surviving >= reference_keypoints * ratio`
pub fn accepts(surviving: usize, reference_keypoints: usize, ratio: f64) -> bool {
    surviving as f64 >= reference_keypoints as f64 * ratio
}

/// Tight box around the points, each rounded to the nearest pixel
pub fn bounding_box(points: &[(f32, f32)]) -> Option<Rect> {
    let mut rounded = points.iter().map(|p| (p.0.round() as i32, p.1.round() as i32));
    let (first_x, first_y) = rounded.next()?;

    let (mut left, mut right, mut top, mut bottom) = (first_x, first_x, first_y, first_y);
    for (x, y) in rounded {
        left = left.min(x);
        right = right.max(x);
        top = top.min(y);
        bottom = bottom.max(y);
    }

    Some(Rect::new(left, top, right - left, bottom - top))
}

/// Runs the matching pipeline for registered feature sets
#[derive(Debug, Clone)]
pub struct FeatureMatcher {
    single: FeatureFilterParams,
    scan_all: FeatureFilterParams,
    ransac: RansacConfig,
}

impl Default for FeatureMatcher {
    fn default() -> Self {
        Self::new(
            FeatureFilterParams::single(),
            FeatureFilterParams::scan_all(),
            RansacConfig::default(),
        )
    }
}

impl FeatureMatcher {
    pub fn new(
        single: FeatureFilterParams,
        scan_all: FeatureFilterParams,
        ransac: RansacConfig,
    ) -> Self {
        Self {
            single,
            scan_all,
            ransac,
        }
    }

    /// Locate one registered element in the scene features
    pub fn locate(
        &self,
        scene: &FeatureDescriptorSet,
        store: &FeatureStore,
        label: &str,
    ) -> Option<TextArea> {
        let Some(reference) = store.get(label) else {
            debug!("Feature set '{}' is not registered", label);
            return None;
        };
        let rect = self.run(scene, reference, label, &self.single)?;
        Some(TextArea::new(label, rect))
    }

    /// Every registered element that passes the pipeline, in label order
    pub fn locate_all(&self, scene: &FeatureDescriptorSet, store: &FeatureStore) -> Vec<TextArea> {
        let mut entries: Vec<_> = store.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        entries
            .into_iter()
            .filter_map(|(label, reference)| {
                self.run(scene, reference, label, &self.scan_all)
                    .map(|rect| TextArea::new(label, rect))
            })
            .collect()
    }

    fn run(
        &self,
        scene: &FeatureDescriptorSet,
        reference: &FeatureDescriptorSet,
        label: &str,
        params: &FeatureFilterParams,
    ) -> Option<Rect> {
        let matches = match_descriptors(reference.descriptors(), scene.descriptors());
        let pruned = ratio_prune(&matches, params.ratio_threshold);
        if pruned.is_empty() {
            trace!("'{}': no correspondences after pruning", label);
            return None;
        }

        let query_points: Vec<(f32, f32)> = pruned
            .iter()
            .map(|m| {
                let kp = reference.keypoints()[m.query_idx];
                (kp.x, kp.y)
            })
            .collect();
        let scene_points: Vec<(f32, f32)> = pruned
            .iter()
            .map(|m| {
                let kp = scene.keypoints()[m.scene_idx];
                (kp.x, kp.y)
            })
            .collect();

        filter_correspondences(
            &query_points,
            &scene_points,
            reference.len(),
            label,
            params,
            &self.ransac,
        )
    }
}

/// Stages after pruning: RANSAC, centroid filter, acceptance, bounding box
pub fn filter_correspondences(
    query_points: &[(f32, f32)],
    scene_points: &[(f32, f32)],
    reference_keypoints: usize,
    label: &str,
    params: &FeatureFilterParams,
    ransac: &RansacConfig,
) -> Option<Rect> {
    let mask = fundamental_inliers(query_points, scene_points, ransac);
    let inliers: Vec<(f32, f32)> = scene_points
        .iter()
        .zip(mask.iter())
        .filter(|(_, &keep)| keep)
        .map(|(p, _)| *p)
        .collect();
    if inliers.is_empty() {
        trace!("'{}': no RANSAC inliers", label);
        return None;
    }

    let clustered = centroid_filter(&inliers, params.centroid_distance);
    debug!(
        "'{}': {} / {} keypoints survive",
        label,
        clustered.len(),
        reference_keypoints
    );
    if !accepts(clustered.len(), reference_keypoints, params.acceptance_ratio) {
        return None;
    }

    bounding_box(&clustered)
}
