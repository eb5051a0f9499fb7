//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A point with color information
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColoredPoint3f {
    pub position: Point3f,
    pub color: [u8; 3],
}

impl ColoredPoint3f {
    pub fn new(position: Point3f, color: [u8; 3]) -> Self {
        Self { position, color }
    }
}

impl Default for ColoredPoint3f {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            color: [255, 255, 255],
        }
    }
}

impl From<ColoredPoint3f> for Point3f {
    fn from(point: ColoredPoint3f) -> Self {
        point.position
    }
}

impl From<Point3f> for ColoredPoint3f {
    fn from(position: Point3f) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }
}

/// Returns true when every coordinate of the point is finite.
///
/// Depth sensors mark missing returns with NaN coordinates; such points must be
/// skipped by every stage instead of being treated as geometry.
#[inline]
pub fn is_finite_point(point: &Point3f) -> bool {
    point.x.is_finite() && point.y.is_finite() && point.z.is_finite()
}

/// Returns true when every component of the vector is finite.
#[inline]
pub fn is_finite_vector(vector: &Vector3f) -> bool {
    vector.x.is_finite() && vector.y.is_finite() && vector.z.is_finite()
}
