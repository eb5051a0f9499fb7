//! Local reference frame estimation

use posecrate_core::{
    Error, FrameEstimate, Keypoint, LocalReferenceFrame, NearestNeighborSearch, Point3f, Result, Vector3f,
};
use nalgebra::Matrix3;
use rayon::prelude::*;

/// Default minimum number of neighbors needed to estimate a frame
pub const DEFAULT_MIN_FRAME_SUPPORT: usize = 5;

/// Relative eigenvalue gap below which two axes cannot be told apart
const EIGEN_GAP_TOLERANCE: f32 = 1e-3;

/// Projections closer to zero than this fraction of the radius do not vote
/// on an axis sign.
const SIGN_TOLERANCE: f32 = 1e-4;

/// Estimates repeatable local reference frames from a keypoint's spherical
/// support.
///
/// The frame comes from the distance-weighted covariance of the neighbors
/// (weights `radius - d`) centered on the keypoint itself. The x and z axes
/// are the eigenvectors of the largest and smallest eigenvalue, each made
/// unique by the majority sign of the neighbor projections, and y = z × x.
#[derive(Debug, Clone)]
pub struct FrameEstimator {
    radius: f32,
    min_support: usize,
}

impl FrameEstimator {
    pub fn new(radius: f32) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidData("Frame radius must be positive and finite".to_string()));
        }
        Ok(Self {
            radius,
            min_support: DEFAULT_MIN_FRAME_SUPPORT,
        })
    }

    pub fn with_min_support(mut self, min_support: usize) -> Self {
        self.min_support = min_support;
        self
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Estimate the frame of a single position against an indexed cloud
    pub fn estimate<S>(&self, position: &Point3f, points: &[Point3f], index: &S) -> FrameEstimate
    where
        S: NearestNeighborSearch,
    {
        let neighbors = index.find_radius_neighbors(position, self.radius);
        if neighbors.len() < self.min_support {
            return FrameEstimate::Hole {
                support: neighbors.len(),
            };
        }

        let offsets: Vec<(Vector3f, f32)> = neighbors
            .iter()
            .map(|(i, distance_squared)| {
                (points[*i] - *position, self.radius - distance_squared.sqrt())
            })
            .collect();

        let mut covariance = Matrix3::zeros();
        let mut total_weight = 0.0f32;
        for (offset, weight) in &offsets {
            covariance += offset * offset.transpose() * *weight;
            total_weight += *weight;
        }
        if total_weight <= 0.0 {
            return FrameEstimate::Ambiguous;
        }
        covariance /= total_weight;

        let eigen = covariance.symmetric_eigen();
        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));
        let (smallest, middle, largest) = (
            eigen.eigenvalues[order[0]],
            eigen.eigenvalues[order[1]],
            eigen.eigenvalues[order[2]],
        );

        if !largest.is_finite() || largest <= f32::EPSILON * self.radius * self.radius {
            return FrameEstimate::Ambiguous;
        }
        if (largest - middle) / largest < EIGEN_GAP_TOLERANCE
            || (middle - smallest) / largest < EIGEN_GAP_TOLERANCE
        {
            return FrameEstimate::Ambiguous;
        }

        let x_axis: Vector3f = eigen.eigenvectors.column(order[2]).normalize();
        let z_axis: Vector3f = eigen.eigenvectors.column(order[0]).normalize();

        let tolerance = SIGN_TOLERANCE * self.radius;
        let (Some(x_axis), Some(z_axis)) = (
            disambiguate_sign(x_axis, &offsets, tolerance),
            disambiguate_sign(z_axis, &offsets, tolerance),
        ) else {
            return FrameEstimate::Ambiguous;
        };

        let y_axis = z_axis.cross(&x_axis);
        FrameEstimate::Valid(LocalReferenceFrame::new(x_axis, y_axis, z_axis))
    }

    /// Fill in the frame of every keypoint
    pub fn compute<S>(&self, keypoints: &mut [Keypoint], points: &[Point3f], index: &S)
    where
        S: NearestNeighborSearch + Sync,
    {
        keypoints.par_iter_mut().for_each(|keypoint| {
            keypoint.frame = self.estimate(&keypoint.position, points, index);
        });
    }
}

/// Orient `axis` towards the side holding most neighbor offsets.
///
/// A tied count falls back to the sign of the projection sum; `None` when
/// that sum vanishes as well.
fn disambiguate_sign(axis: Vector3f, offsets: &[(Vector3f, f32)], tolerance: f32) -> Option<Vector3f> {
    let mut positive = 0usize;
    let mut negative = 0usize;
    let mut sum = 0.0f32;
    for (offset, _) in offsets {
        let projection = axis.dot(offset);
        sum += projection;
        if projection > tolerance {
            positive += 1;
        } else if projection < -tolerance {
            negative += 1;
        }
    }

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Some(axis),
        std::cmp::Ordering::Less => Some(-axis),
        std::cmp::Ordering::Equal if sum > tolerance => Some(axis),
        std::cmp::Ordering::Equal if sum < -tolerance => Some(-axis),
        std::cmp::Ordering::Equal => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nearest_neighbor::SpatialIndex;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};

    /// Asymmetric curved patch sampled on a regular grid
    fn patch() -> Vec<Point3f> {
        let mut points = Vec::new();
        for i in 0..21 {
            for j in 0..21 {
                let x = (i as f32 - 10.0) * 0.05;
                let y = (j as f32 - 10.0) * 0.05;
                let z = 0.4 * x * x + 0.1 * y * y + 0.3 * x * y + 0.2 * x;
                points.push(Point3f::new(x, y, z));
            }
        }
        points
    }

    #[test]
    fn test_frame_is_orthonormal() {
        let points = patch();
        let index = SpatialIndex::new(&points);
        let estimator = FrameEstimator::new(0.3).unwrap();

        let estimate = estimator.estimate(&points[220], &points, &index);
        let frame = estimate.frame().expect("curved patch should yield a frame");
        assert!(frame.is_orthonormal(1e-4));
    }

    #[test]
    fn test_frames_follow_rigid_motion() {
        let points = patch();
        let rotation = Rotation3::from_euler_angles(0.3, -1.1, 2.0);
        let translation = Vector3::new(1.0, -2.0, 0.5);
        let moved: Vec<Point3f> = points.iter().map(|p| rotation * p + translation).collect();

        let estimator = FrameEstimator::new(0.3).unwrap();
        let index = SpatialIndex::new(&points);
        let moved_index = SpatialIndex::new(&moved);

        for &i in &[200usize, 220, 230, 150] {
            let original = estimator.estimate(&points[i], &points, &index);
            let transformed = estimator.estimate(&moved[i], &moved, &moved_index);
            let expected = original.frame().unwrap().rotated(&rotation);
            let actual = transformed.frame().unwrap();
            assert_relative_eq!(actual.x_axis, expected.x_axis, epsilon = 1e-3);
            assert_relative_eq!(actual.y_axis, expected.y_axis, epsilon = 1e-3);
            assert_relative_eq!(actual.z_axis, expected.z_axis, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_sparse_support_is_a_hole() {
        let points = vec![
            Point3f::origin(),
            Point3f::new(0.1, 0.0, 0.0),
            Point3f::new(0.0, 0.1, 0.0),
            Point3f::new(5.0, 5.0, 5.0),
        ];
        let index = SpatialIndex::new(&points);
        let estimator = FrameEstimator::new(0.5).unwrap();
        assert_eq!(
            estimator.estimate(&points[0], &points, &index),
            FrameEstimate::Hole { support: 3 }
        );
    }

    #[test]
    fn test_symmetric_support_is_ambiguous() {
        // Flat square grid: the in-plane axes cannot be told apart
        let mut points = Vec::new();
        for i in -5i32..=5 {
            for j in -5i32..=5 {
                points.push(Point3f::new(i as f32 * 0.1, j as f32 * 0.1, 0.0));
            }
        }
        let index = SpatialIndex::new(&points);
        let estimator = FrameEstimator::new(0.35).unwrap();
        let center = Point3f::origin();
        assert_eq!(estimator.estimate(&center, &points, &index), FrameEstimate::Ambiguous);
    }

    #[test]
    fn test_compute_fills_keypoints() {
        let points = patch();
        let index = SpatialIndex::new(&points);
        let mut keypoints: Vec<Keypoint> = [220usize, 0]
            .iter()
            .map(|&i| Keypoint::new(i, points[i]))
            .collect();
        keypoints.push(Keypoint::new(0, Point3f::new(50.0, 50.0, 50.0)));

        FrameEstimator::new(0.3).unwrap().compute(&mut keypoints, &points, &index);
        assert!(keypoints[0].frame.is_valid());
        assert_eq!(keypoints[2].frame, FrameEstimate::Hole { support: 0 });
    }

    #[test]
    fn test_invalid_radius() {
        assert!(FrameEstimator::new(0.0).is_err());
        assert!(FrameEstimator::new(f32::INFINITY).is_err());
    }
}
