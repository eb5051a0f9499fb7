//! # PoseCrate Algorithms
//!
//! The stages of the correspondence-grouping recognition pipeline.
//!
//! Every stage works on a dense point cloud plus a spatial index built over it,
//! and the stages chain as follows: cloud resolution, normal estimation,
//! keypoint sampling, local reference frames, SHOT descriptors, descriptor
//! matching, and Hough voting with per-cluster rigid pose recovery.
//! [`RecognitionPipeline`] runs all of them from a single [`RecognitionConfig`].

pub mod nearest_neighbor;
pub mod resolution;
pub mod sampling;
pub mod normals;
pub mod reference_frame;
pub mod descriptors;
pub mod correspondence;
pub mod registration;
pub mod hough;
pub mod config;
pub mod pipeline;

// Re-export commonly used items
pub use nearest_neighbor::*;
pub use resolution::*;
pub use sampling::*;
pub use normals::*;
pub use reference_frame::*;
pub use descriptors::*;
pub use correspondence::*;
pub use registration::*;
pub use hough::*;
pub use config::*;
pub use pipeline::*;
