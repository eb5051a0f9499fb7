//! Rigid registration from known point correspondences

use posecrate_core::{Error, Isometry3, Point3f, Result, Vector3f};
use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion};
use rand::Rng;

/// Ratio between the middle and largest spread eigenvalues below which a
/// point set is treated as collinear.
const COLLINEAR_RATIO: f32 = 1e-6;

/// Minimum number of correspondences that fixes a rigid transform
pub const MIN_SAMPLE_SIZE: usize = 3;

fn centroid(points: &[Point3f]) -> Vector3f {
    points.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords) / points.len() as f32
}

/// True when the points lie on one line (or coincide), which leaves the
/// rotation about that line undetermined.
pub fn are_collinear(points: &[Point3f]) -> bool {
    if points.len() < MIN_SAMPLE_SIZE {
        return true;
    }

    let center = centroid(points);
    let mut spread = Matrix3::zeros();
    for point in points {
        let d = point.coords - center;
        spread += d * d.transpose();
    }

    let eigenvalues = spread.symmetric_eigenvalues();
    let mut sorted = [eigenvalues[0], eigenvalues[1], eigenvalues[2]];
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (middle, largest) = (sorted[1], sorted[2]);

    !largest.is_finite() || largest <= 0.0 || middle <= largest * COLLINEAR_RATIO
}

/// Least-squares rigid transform mapping `source` onto `target` (SVD method).
///
/// The points are paired by position in the slices. A reflection in the
/// SVD solution is corrected by negating the axis of the smallest singular
/// value.
///
/// # Arguments
/// * `source` - Points to be moved
/// * `target` - Where each source point should land
///
/// # Returns
/// * `Result<Isometry3<f32>>` - Transform with `T * source[i] ≈ target[i]`
pub fn estimate_rigid_transform(source: &[Point3f], target: &[Point3f]) -> Result<Isometry3<f32>> {
    if source.len() != target.len() || source.is_empty() {
        return Err(Error::InvalidData("Point correspondence mismatch".to_string()));
    }

    let source_centroid = centroid(source);
    let target_centroid = centroid(target);

    // Cross-covariance H
    let mut h = Matrix3::zeros();
    for (src, tgt) in source.iter().zip(target.iter()) {
        let p = src.coords - source_centroid;
        let q = tgt.coords - target_centroid;
        h += p * q.transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u.ok_or_else(|| Error::Algorithm("SVD U matrix not available".to_string()))?;
    let v_t = svd.v_t.ok_or_else(|| Error::Algorithm("SVD V^T matrix not available".to_string()))?;

    let mut r = v_t.transpose() * u.transpose();

    // Ensure proper rotation (det(R) = 1)
    if r.determinant() < 0.0 {
        let smallest = svd.singular_values.imin();
        let mut v_t_corrected = v_t;
        v_t_corrected.set_row(smallest, &(-v_t.row(smallest)));
        r = v_t_corrected.transpose() * u.transpose();
    }

    if r.iter().any(|v| !v.is_finite()) {
        return Err(Error::Algorithm("Rigid fit produced a non-finite rotation".to_string()));
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let translation = target_centroid - rotation * source_centroid;

    Ok(Isometry3::from_parts(Translation3::from(translation), rotation))
}

/// Outcome of RANSAC correspondence rejection
#[derive(Debug, Clone)]
pub struct RansacRejection {
    /// Transform refitted on all inliers
    pub transform: Isometry3<f32>,
    /// Positions (ascending) of the pairs consistent with the best sample
    pub inliers: Vec<usize>,
    /// Samples drawn before stopping
    pub iterations: usize,
}

/// Reject correspondences that disagree with the dominant rigid motion.
///
/// Repeatedly fits a transform to 3 random pairs and counts the pairs it
/// maps within `inlier_threshold`. The sample with the most inliers wins;
/// the search stops early once every pair agrees. Collinear samples are
/// skipped. Returns `None` when fewer than 3 inliers survive or they are
/// collinear.
///
/// # Arguments
/// * `source` - Model-side points
/// * `target` - Scene-side points, paired by position with `source`
/// * `inlier_threshold` - Maximum residual of an inlier
/// * `max_iterations` - Upper bound on samples drawn
/// * `rng` - Random source; seed it for reproducible results
pub fn reject_correspondences_ransac<R>(
    source: &[Point3f],
    target: &[Point3f],
    inlier_threshold: f32,
    max_iterations: usize,
    rng: &mut R,
) -> Result<Option<RansacRejection>>
where
    R: Rng + ?Sized,
{
    if source.len() != target.len() {
        return Err(Error::InvalidData("Point correspondence mismatch".to_string()));
    }
    if !inlier_threshold.is_finite() || inlier_threshold <= 0.0 {
        return Err(Error::InvalidData("Inlier threshold must be positive".to_string()));
    }
    if max_iterations == 0 {
        return Err(Error::InvalidData("Max iterations must be positive".to_string()));
    }
    if source.len() < MIN_SAMPLE_SIZE {
        return Ok(None);
    }

    let threshold_squared = inlier_threshold * inlier_threshold;
    let inliers_of = |transform: &Isometry3<f32>| -> Vec<usize> {
        source
            .iter()
            .zip(target.iter())
            .enumerate()
            .filter(|(_, (s, t))| (transform * **s - **t).norm_squared() <= threshold_squared)
            .map(|(i, _)| i)
            .collect()
    };

    let mut best_inliers: Vec<usize> = Vec::new();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let sample = rand::seq::index::sample(rng, source.len(), MIN_SAMPLE_SIZE).into_vec();
        let sample_source: Vec<Point3f> = sample.iter().map(|&i| source[i]).collect();
        let sample_target: Vec<Point3f> = sample.iter().map(|&i| target[i]).collect();
        if are_collinear(&sample_source) || are_collinear(&sample_target) {
            continue;
        }

        let Ok(candidate) = estimate_rigid_transform(&sample_source, &sample_target) else {
            continue;
        };

        let inliers = inliers_of(&candidate);
        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
            if best_inliers.len() == source.len() {
                break;
            }
        }
    }

    if best_inliers.len() < MIN_SAMPLE_SIZE {
        return Ok(None);
    }

    let inlier_source: Vec<Point3f> = best_inliers.iter().map(|&i| source[i]).collect();
    let inlier_target: Vec<Point3f> = best_inliers.iter().map(|&i| target[i]).collect();
    if are_collinear(&inlier_source) {
        return Ok(None);
    }

    let transform = estimate_rigid_transform(&inlier_source, &inlier_target)?;
    Ok(Some(RansacRejection {
        transform,
        inliers: best_inliers,
        iterations,
    }))
}
