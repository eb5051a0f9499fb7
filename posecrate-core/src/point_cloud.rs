//! Point cloud data structures and functionality

use crate::point::*;
use crate::transform::Transform3D;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A generic point cloud container
///
/// Points keep their load order: every stage refers to points by their index
/// in this vector, and clouds may contain non-finite entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud<T> {
    pub points: Vec<T>,
}

/// A point cloud with 3D points
pub type PointCloud3f = PointCloud<Point3f>;

/// A point cloud with colored points
pub type ColoredPointCloud3f = PointCloud<ColoredPoint3f>;

impl<T> PointCloud<T> {
    /// Create a new empty point cloud
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
        }
    }

    /// Create a new point cloud with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a point cloud from a vector of points
    pub fn from_points(points: Vec<T>) -> Self {
        Self { points }
    }

    /// Get the number of points in the cloud
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add a point to the cloud
    pub fn push(&mut self, point: T) {
        self.points.push(point);
    }

    /// Get an iterator over the points
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.points.iter()
    }
}

impl<T> PointCloud<T>
where
    T: Copy,
    Point3f: From<T>,
{
    /// Positions of all points, in order, including non-finite ones
    pub fn positions(&self) -> PointCloud<Point3f> {
        self.points.iter().map(|p| Point3f::from(*p)).collect()
    }

    /// Number of points with finite coordinates
    pub fn finite_len(&self) -> usize {
        self.points
            .iter()
            .filter(|p| is_finite_point(&Point3f::from(**p)))
            .count()
    }
}

impl<T> Default for PointCloud<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for PointCloud<T> {
    type Output = T;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl<T> IntoIterator for PointCloud<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a PointCloud<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

impl<T> Extend<T> for PointCloud<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.points.extend(iter);
    }
}

impl<T> FromIterator<T> for PointCloud<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            points: Vec::from_iter(iter),
        }
    }
}

impl PointCloud<Point3f> {
    /// Apply a transformation to all points in the cloud
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            *point = transform.transform_point(point);
        }
    }

    /// Return a transformed copy of the cloud
    pub fn transformed(&self, transform: &Transform3D) -> Self {
        self.points
            .iter()
            .map(|p| transform.transform_point(p))
            .collect()
    }
}

impl PointCloud<ColoredPoint3f> {
    /// Apply a transformation to all point positions, keeping colors
    pub fn transform(&mut self, transform: &Transform3D) {
        for point in &mut self.points {
            point.position = transform.transform_point(&point.position);
        }
    }

    /// Return a transformed copy of the cloud with every point painted `color`
    pub fn transformed_with_color(&self, transform: &Transform3D, color: [u8; 3]) -> Self {
        self.points
            .iter()
            .map(|p| ColoredPoint3f::new(transform.transform_point(&p.position), color))
            .collect()
    }
}
