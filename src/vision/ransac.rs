//! RANSAC estimation of the fundamental matrix
//!
//! Used purely as an outlier filter: only the inlier mask is consumed by the
//! feature matcher. Sampling is driven by a seeded RNG so the same input
//! always yields the same mask.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

/// Correspondences needed for one model hypothesis (normalized 8-point)
pub const MIN_SAMPLE: usize = 8;

/// Configuration for the RANSAC loop
#[derive(Debug, Clone)]
pub struct RansacConfig {
    /// Maximum epipolar distance in pixels for an inlier
    pub threshold: f64,
    /// Desired probability of drawing at least one outlier-free sample
    pub confidence: f64,
    /// Hard cap on hypotheses
    pub max_iterations: usize,
    /// Seed for sample selection
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            threshold: 3.0,
            confidence: 0.99,
            max_iterations: 2000,
            seed: 0x00c0_ffee,
        }
    }
}

/// Inlier flag per correspondence.
///
/// `query[i]` and `scene[i]` form correspondence `i`. Fewer than
/// [`MIN_SAMPLE`] pairs cannot support a model and produce an all-false mask.
pub fn fundamental_inliers(
    query: &[(f32, f32)],
    scene: &[(f32, f32)],
    config: &RansacConfig,
) -> Vec<bool> {
    let n = query.len().min(scene.len());
    if n < MIN_SAMPLE {
        return vec![false; n];
    }

    let query: Vec<(f64, f64)> = query[..n].iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    let scene: Vec<(f64, f64)> = scene[..n].iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    let threshold_sq = config.threshold * config.threshold;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_mask = vec![false; n];
    let mut best_count = 0usize;
    let mut iterations = config.max_iterations.max(1);
    let mut iteration = 0usize;

    while iteration < iterations {
        iteration += 1;

        let sample = rand::seq::index::sample(&mut rng, n, MIN_SAMPLE).into_vec();
        let sample_query: Vec<_> = sample.iter().map(|&i| query[i]).collect();
        let sample_scene: Vec<_> = sample.iter().map(|&i| scene[i]).collect();

        let Some(model) = eight_point(&sample_query, &sample_scene) else {
            continue;
        };

        let mask: Vec<bool> = query
            .iter()
            .zip(scene.iter())
            .map(|(&q, &s)| epipolar_error(&model, q, s) <= threshold_sq)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if count > best_count {
            best_count = count;
            best_mask = mask;
            iterations = adaptive_iterations(
                best_count as f64 / n as f64,
                config.confidence,
                config.max_iterations,
            )
            .max(iteration);
        }

        if best_count == n {
            break;
        }
    }

    debug!(
        "RANSAC kept {}/{} correspondences after {} hypotheses",
        best_count, n, iteration
    );
    best_mask
}

/// Number of hypotheses needed to reach `confidence` at inlier ratio `ratio`
fn adaptive_iterations(ratio: f64, confidence: f64, max_iterations: usize) -> usize {
    let outlier_free = ratio.powi(MIN_SAMPLE as i32);
    if outlier_free >= 1.0 - f64::EPSILON {
        return 1;
    }
    if outlier_free <= f64::EPSILON {
        return max_iterations;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - outlier_free).ln();
    if !needed.is_finite() {
        return max_iterations;
    }
    (needed.ceil() as usize).clamp(1, max_iterations)
}

/// Symmetric epipolar distance (squared, worst of both images)
fn epipolar_error(f: &Matrix3<f64>, query: (f64, f64), scene: (f64, f64)) -> f64 {
    let x1 = Vector3::new(query.0, query.1, 1.0);
    let x2 = Vector3::new(scene.0, scene.1, 1.0);

    let line2 = f * x1;
    let line1 = f.transpose() * x2;
    let d = x2.dot(&line2);

    let n2 = line2.x * line2.x + line2.y * line2.y;
    let n1 = line1.x * line1.x + line1.y * line1.y;
    if n1 <= f64::EPSILON || n2 <= f64::EPSILON {
        return f64::INFINITY;
    }

    (d * d / n1).max(d * d / n2)
}

/// Hartley normalization: centroid to origin, mean distance sqrt(2)
fn normalize(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points
        .iter()
        .map(|p| ((p.0 - cx) * scale, (p.1 - cy) * scale))
        .collect();
    let transform = Matrix3::new(
        scale, 0.0, -scale * cx,
        0.0, scale, -scale * cy,
        0.0, 0.0, 1.0,
    );
    Some((normalized, transform))
}

/// Normalized 8-point estimate with rank-2 enforcement
fn eight_point(query: &[(f64, f64)], scene: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let (q, t1) = normalize(query)?;
    let (s, t2) = normalize(scene)?;

    let mut normal = SMatrix::<f64, 9, 9>::zeros();
    for (&(x1, y1), &(x2, y2)) in q.iter().zip(s.iter()) {
        let row = SVector::<f64, 9>::from_column_slice(&[
            x2 * x1, x2 * y1, x2,
            y2 * x1, y2 * y1, y2,
            x1, y1, 1.0,
        ]);
        normal += row * row.transpose();
    }

    let eigen = normal.symmetric_eigen();
    let smallest = eigen.eigenvalues.imin();
    let f = eigen.eigenvectors.column(smallest);

    let estimate = Matrix3::new(
        f[0], f[1], f[2],
        f[3], f[4], f[5],
        f[6], f[7], f[8],
    );

    let svd = estimate.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut singular = svd.singular_values;
    singular[2] = 0.0;
    let rank2 = u * Matrix3::from_diagonal(&singular) * v_t;

    let fundamental = t2.transpose() * rank2 * t1;
    let norm = fundamental.norm();
    if !norm.is_finite() || norm <= f64::EPSILON {
        return None;
    }
    Some(fundamental / norm)
}
