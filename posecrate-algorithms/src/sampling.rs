//! Keypoint sampling

use crate::nearest_neighbor::SpatialIndex;
use posecrate_core::{is_finite_point, Error, NearestNeighborSearch, Point3f, PointCloud, Result};

/// Uniform keypoint sampling by greedy decimation.
///
/// Points are visited in input order; an unvisited finite point becomes a
/// keypoint and suppresses every point strictly closer than `radius`. The
/// result therefore has no two keypoints closer than `radius`, and every
/// finite input point lies within `radius` of some keypoint.
///
/// # Arguments
/// * `cloud` - Input point cloud
/// * `radius` - Minimum spacing between keypoints
///
/// # Returns
/// * `Result<Vec<usize>>` - Indices of the kept points, ascending
pub fn uniform_sampling(cloud: &PointCloud<Point3f>, radius: f32) -> Result<Vec<usize>> {
    let index = SpatialIndex::from_cloud(cloud);
    uniform_sampling_with_index(&cloud.points, &index, radius)
}

/// Same as [`uniform_sampling`] but reusing an index already built over
/// `points`.
pub fn uniform_sampling_with_index<S>(points: &[Point3f], index: &S, radius: f32) -> Result<Vec<usize>>
where
    S: NearestNeighborSearch,
{
    if !radius.is_finite() || radius <= 0.0 {
        return Err(Error::InvalidData("Sampling radius must be positive and finite".to_string()));
    }

    let radius_squared = radius * radius;
    let mut visited = vec![false; points.len()];
    let mut keypoints = Vec::new();

    for (i, point) in points.iter().enumerate() {
        if visited[i] || !is_finite_point(point) {
            continue;
        }
        keypoints.push(i);
        for (neighbor, distance_squared) in index.find_radius_neighbors(point, radius) {
            if distance_squared < radius_squared {
                visited[neighbor] = true;
            }
        }
    }

    Ok(keypoints)
}
