//! Core data structures and traits for posecrate
//!
//! This crate provides the fundamental types shared by every recognition stage:
//! points and point clouds, rigid transforms, local reference frames, SHOT
//! descriptors, keypoint records, correspondences and pose hypotheses.

pub mod point;
pub mod point_cloud;
pub mod traits;
pub mod transform;
pub mod frame;
pub mod descriptor;
pub mod keypoint;
pub mod correspondence;
pub mod error;

pub use point::*;
pub use point_cloud::*;
pub use traits::*;
pub use transform::*;
pub use frame::*;
pub use descriptor::*;
pub use keypoint::*;
pub use correspondence::*;
pub use error::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3, Matrix3, Matrix4, Isometry3, UnitQuaternion, Translation3};

// Type aliases for easier imports
pub type Point = Point3f;
