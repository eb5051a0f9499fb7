//! # PoseCrate
//!
//! Finds every instance of a known 3D model in a scene point cloud and
//! recovers the rigid pose of each one.
//!
//! This is the umbrella crate that provides convenient access to all PoseCrate
//! functionality. You can use this crate to get everything in one place, or use
//! individual crates for more granular control over dependencies.
//!
//! ## Features
//!
//! - **Core**: Points, clouds, reference frames, descriptors, keypoints and pose hypotheses
//! - **Algorithms**: The recognition stages and the pipeline that chains them
//! - **I/O**: PCD reading and writing
//!
//! ## Quick Start
//!
//! ```rust
//! use posecrate::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let model: PointCloud<Point3f> = (0..=8)
//!         .flat_map(|i| (0..=8).map(move |j| (i as f32 / 8.0, j as f32 / 8.0)))
//!         .map(|(x, y)| Point3f::new(x, y, 0.3 * (2.0 * x).sin() * y))
//!         .collect();
//!
//!     let result = recognize(&model, &model, RecognitionConfig::default())?;
//!     println!("Model instances found: {}", result.instance_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: Enables core, algorithms and io
//! - `algorithms`: Recognition pipeline
//! - `io`: PCD file support
//! - `all`: Enables all features

// Re-export core functionality
pub use posecrate_core::*;

// Re-export sub-crates
#[cfg(feature = "algorithms")]
pub use posecrate_algorithms as algorithms;

#[cfg(feature = "io")]
pub use posecrate_io as io;

/// Convenient imports for common use cases
pub mod prelude {
    pub use posecrate_core::*;

    #[cfg(feature = "algorithms")]
    pub use posecrate_algorithms::*;

    #[cfg(feature = "io")]
    pub use posecrate_io::*;
}
