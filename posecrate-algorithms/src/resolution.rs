//! Cloud resolution estimation

use crate::nearest_neighbor::SpatialIndex;
use posecrate_core::{is_finite_point, NearestNeighborSearch, Point3f, PointCloud};
use rayon::prelude::*;

/// Compute the resolution of a cloud: the mean distance from each finite
/// point to its nearest distinct neighbor.
///
/// Returns 0 when no point has a neighbor (empty, single point or all
/// non-finite clouds).
///
/// # Arguments
/// * `cloud` - Input point cloud
///
/// # Returns
/// * `f32` - Mean nearest-neighbor spacing
///
/// # Example
/// ```rust
/// use posecrate_algorithms::compute_cloud_resolution;
/// use posecrate_core::{PointCloud, Point3f};
///
/// let cloud = PointCloud::from_points(vec![
///     Point3f::new(0.0, 0.0, 0.0),
///     Point3f::new(0.5, 0.0, 0.0),
///     Point3f::new(1.0, 0.0, 0.0),
/// ]);
/// assert!((compute_cloud_resolution(&cloud) - 0.5).abs() < 1e-6);
/// ```
pub fn compute_cloud_resolution(cloud: &PointCloud<Point3f>) -> f32 {
    let index = SpatialIndex::from_cloud(cloud);
    cloud_resolution_with_index(&cloud.points, &index)
}

/// Same as [`compute_cloud_resolution`] but reusing an index already built
/// over `points`.
pub fn cloud_resolution_with_index<S>(points: &[Point3f], index: &S) -> f32
where
    S: NearestNeighborSearch + Sync,
{
    // The first result of a self query is the point itself.
    let spacings: Vec<Option<f32>> = points
        .par_iter()
        .map(|point| {
            if !is_finite_point(point) {
                return None;
            }
            let neighbors = index.find_k_nearest(point, 2);
            (neighbors.len() == 2).then(|| neighbors[1].1.sqrt())
        })
        .collect();

    // Summed sequentially so the result does not depend on the thread count.
    let (total, count) = spacings
        .iter()
        .flatten()
        .fold((0.0f64, 0usize), |(total, count), spacing| {
            (total + *spacing as f64, count + 1)
        });

    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}
