//! Normal estimation algorithms

use crate::nearest_neighbor::SpatialIndex;
use posecrate_core::{is_finite_point, Error, NearestNeighborSearch, Point3f, PointCloud, Result, Vector3f};
use nalgebra::Matrix3;
use rayon::prelude::*;

/// Default neighborhood size for normal estimation
pub const DEFAULT_NORMAL_K: usize = 10;

/// Ratio between the middle and largest covariance eigenvalues below which a
/// neighborhood is treated as collinear.
const COLLINEAR_RATIO: f32 = 1e-6;

/// Estimate a surface normal for every point of a cloud.
///
/// Each normal is the eigenvector of the smallest eigenvalue of the covariance
/// of the point's `k` nearest neighbors, flipped to face `viewpoint`. Points
/// that are non-finite, have fewer than 3 neighbors, or sit in a degenerate
/// neighborhood get `None`.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `k` - Number of nearest neighbors (at least 3)
/// * `viewpoint` - Position the normals are oriented towards
///
/// # Returns
/// * `Result<Vec<Option<Vector3f>>>` - One entry per input point
pub fn estimate_normals(
    cloud: &PointCloud<Point3f>,
    k: usize,
    viewpoint: &Point3f,
) -> Result<Vec<Option<Vector3f>>> {
    let index = SpatialIndex::from_cloud(cloud);
    estimate_normals_with_index(&cloud.points, &index, k, viewpoint)
}

/// Same as [`estimate_normals`] but reusing an index already built over
/// `points`.
pub fn estimate_normals_with_index<S>(
    points: &[Point3f],
    index: &S,
    k: usize,
    viewpoint: &Point3f,
) -> Result<Vec<Option<Vector3f>>>
where
    S: NearestNeighborSearch + Sync,
{
    if k < 3 {
        return Err(Error::InvalidData("k must be at least 3 for normal estimation".to_string()));
    }
    if !is_finite_point(viewpoint) {
        return Err(Error::InvalidData("Viewpoint must be finite".to_string()));
    }

    let normals = points
        .par_iter()
        .map(|point| {
            if !is_finite_point(point) {
                return None;
            }
            let neighbors = index.find_k_nearest(point, k);
            let neighborhood: Vec<Point3f> = neighbors.iter().map(|(i, _)| points[*i]).collect();
            let normal = fit_normal(&neighborhood)?;
            Some(orient_towards(normal, point, viewpoint))
        })
        .collect();

    Ok(normals)
}

/// Normal of the least-squares plane through `points`
fn fit_normal(points: &[Point3f]) -> Option<Vector3f> {
    if points.len() < 3 {
        return None;
    }

    let n = points.len() as f32;
    let centroid = points.iter().fold(Vector3f::zeros(), |acc, p| acc + p.coords) / n;

    let mut covariance = Matrix3::zeros();
    for point in points {
        let d = point.coords - centroid;
        covariance += d * d.transpose();
    }
    covariance /= n;

    let eigen = covariance.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let largest = eigen.eigenvalues[order[2]];
    let middle = eigen.eigenvalues[order[1]];
    if !largest.is_finite() || largest <= 0.0 || middle <= largest * COLLINEAR_RATIO {
        return None;
    }

    let normal: Vector3f = eigen.eigenvectors.column(order[0]).into_owned();
    let norm = normal.norm();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return None;
    }
    Some(normal / norm)
}

fn orient_towards(normal: Vector3f, point: &Point3f, viewpoint: &Point3f) -> Vector3f {
    if normal.dot(&(*viewpoint - *point)) < 0.0 {
        -normal
    } else {
        normal
    }
}
