//! Local reference frames attached to keypoints

use crate::point::Vector3f;
use nalgebra::{Matrix3, Rotation3};
use serde::{Deserialize, Serialize};

/// An orthonormal, sign-disambiguated basis attached to a keypoint.
///
/// Two observations of the same surface patch yield frames related by the
/// rigid motion between them, which is what makes descriptors and votes
/// pose invariant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalReferenceFrame {
    pub x_axis: Vector3f,
    pub y_axis: Vector3f,
    pub z_axis: Vector3f,
}

impl LocalReferenceFrame {
    pub fn new(x_axis: Vector3f, y_axis: Vector3f, z_axis: Vector3f) -> Self {
        Self { x_axis, y_axis, z_axis }
    }

    /// Frame aligned with the world axes
    pub fn identity() -> Self {
        Self::new(Vector3f::x(), Vector3f::y(), Vector3f::z())
    }

    /// Matrix whose rows are the axes: maps world offsets to local coordinates.
    pub fn to_local_matrix(&self) -> Matrix3<f32> {
        Matrix3::from_rows(&[
            self.x_axis.transpose(),
            self.y_axis.transpose(),
            self.z_axis.transpose(),
        ])
    }

    /// Express a world-space offset in this frame
    pub fn to_local(&self, offset: &Vector3f) -> Vector3f {
        Vector3f::new(
            self.x_axis.dot(offset),
            self.y_axis.dot(offset),
            self.z_axis.dot(offset),
        )
    }

    /// Map local coordinates back to a world-space offset
    pub fn to_world(&self, local: &Vector3f) -> Vector3f {
        self.x_axis * local.x + self.y_axis * local.y + self.z_axis * local.z
    }

    /// Frame with every axis rotated by `rotation`
    pub fn rotated(&self, rotation: &Rotation3<f32>) -> Self {
        Self::new(
            rotation * self.x_axis,
            rotation * self.y_axis,
            rotation * self.z_axis,
        )
    }

    /// True when the axes are finite, unit length and mutually orthogonal, and
    /// form a right-handed basis.
    pub fn is_orthonormal(&self, epsilon: f32) -> bool {
        let axes = [self.x_axis, self.y_axis, self.z_axis];
        if axes.iter().any(|a| !(a.x.is_finite() && a.y.is_finite() && a.z.is_finite())) {
            return false;
        }
        let unit = axes.iter().all(|a| (a.norm() - 1.0).abs() <= epsilon);
        let orthogonal = self.x_axis.dot(&self.y_axis).abs() <= epsilon
            && self.y_axis.dot(&self.z_axis).abs() <= epsilon
            && self.z_axis.dot(&self.x_axis).abs() <= epsilon;
        let right_handed = (self.x_axis.cross(&self.y_axis) - self.z_axis).norm() <= epsilon * 4.0;
        unit && orthogonal && right_handed
    }
}

/// Outcome of estimating a frame for one keypoint.
///
/// Keypoints whose frame could not be estimated are kept in their keypoint
/// set with the reason recorded; they take no part in description, matching
/// or voting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FrameEstimate {
    Valid(LocalReferenceFrame),
    /// Fewer neighbors than the minimum support inside the frame radius
    Hole { support: usize },
    /// The neighborhood is too symmetric to fix an axis or its sign
    Ambiguous,
}

impl FrameEstimate {
    pub fn frame(&self) -> Option<&LocalReferenceFrame> {
        match self {
            FrameEstimate::Valid(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, FrameEstimate::Valid(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_local_world_round_trip() {
        let rotation = Rotation3::from_euler_angles(0.4, -0.7, 1.3);
        let frame = LocalReferenceFrame::identity().rotated(&rotation);
        assert!(frame.is_orthonormal(1e-5));

        let offset = Vector3f::new(0.3, -1.2, 2.5);
        let local = frame.to_local(&offset);
        assert_relative_eq!(frame.to_world(&local), offset, epsilon = 1e-5);
        assert_relative_eq!(frame.to_local_matrix() * offset, local, epsilon = 1e-5);
    }

    #[test]
    fn test_orthonormal_rejects_bad_frames() {
        let skewed = LocalReferenceFrame::new(
            Vector3f::x(),
            Vector3f::new(0.5, 0.5, 0.0).normalize(),
            Vector3f::z(),
        );
        assert!(!skewed.is_orthonormal(1e-4));

        let left_handed = LocalReferenceFrame::new(Vector3f::x(), Vector3f::y(), -Vector3f::z());
        assert!(!left_handed.is_orthonormal(1e-4));

        let nan = LocalReferenceFrame::new(Vector3f::new(f32::NAN, 0.0, 0.0), Vector3f::y(), Vector3f::z());
        assert!(!nan.is_orthonormal(1e-4));
    }

    #[test]
    fn test_estimate_accessors() {
        assert!(FrameEstimate::Valid(LocalReferenceFrame::identity()).is_valid());
        assert!(FrameEstimate::Hole { support: 2 }.frame().is_none());
        assert!(!FrameEstimate::Ambiguous.is_valid());
    }
}
