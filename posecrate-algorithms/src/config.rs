//! Recognition configuration

use crate::correspondence::MATCH_THRESHOLD;
use crate::normals::DEFAULT_NORMAL_K;
use crate::reference_frame::DEFAULT_MIN_FRAME_SUPPORT;
use posecrate_core::{is_finite_point, Error, Point3f, Result};
use serde::{Deserialize, Serialize};

/// Seed used for correspondence rejection unless overridden
pub const DEFAULT_SEED: u64 = 0x5eed_c0de;

/// Default number of RANSAC samples per Hough cluster
pub const DEFAULT_REJECTION_ITERATIONS: usize = 10_000;

/// Configuration for the recognition pipeline
///
/// The five radii are expressed in multiples of the model cloud resolution
/// and converted to absolute lengths by [`RecognitionConfig::scaled`]. The
/// clustering threshold is a vote count and is never scaled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Model keypoint sampling radius
    pub model_ss: f32,
    /// Scene keypoint sampling radius
    pub scene_ss: f32,
    /// Local reference frame support radius
    pub rf_rad: f32,
    /// Descriptor support radius
    pub descr_rad: f32,
    /// Hough bin edge length, also the RANSAC inlier threshold
    pub cg_size: f32,
    /// Minimum bin weight for a cluster
    pub cg_thresh: f32,
    /// Neighbors used for normal estimation
    pub normal_k: usize,
    /// Normals are oriented towards this point
    pub viewpoint: Point3f,
    /// Minimum neighbors for a local reference frame
    pub min_frame_support: usize,
    /// Split votes trilinearly over neighboring bins
    pub use_interpolation: bool,
    /// Weight votes by `1 - descriptor distance`
    pub use_distance_weight: bool,
    /// Squared descriptor distance below which matches are kept
    pub match_threshold: f32,
    /// RANSAC samples per cluster
    pub rejection_iterations: usize,
    /// Seed for correspondence rejection
    pub seed: u64,
    /// Worker threads (None = rayon global pool)
    pub num_threads: Option<usize>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model_ss: 10.0,
            scene_ss: 30.0,
            rf_rad: 15.0,
            descr_rad: 20.0,
            cg_size: 10.0,
            cg_thresh: 5.0,
            normal_k: DEFAULT_NORMAL_K,
            viewpoint: Point3f::origin(),
            min_frame_support: DEFAULT_MIN_FRAME_SUPPORT,
            use_interpolation: true,
            use_distance_weight: false,
            match_threshold: MATCH_THRESHOLD,
            rejection_iterations: DEFAULT_REJECTION_ITERATIONS,
            seed: DEFAULT_SEED,
            num_threads: None,
        }
    }
}

impl RecognitionConfig {
    pub fn with_model_ss(mut self, model_ss: f32) -> Self {
        self.model_ss = model_ss;
        self
    }

    pub fn with_scene_ss(mut self, scene_ss: f32) -> Self {
        self.scene_ss = scene_ss;
        self
    }

    pub fn with_rf_rad(mut self, rf_rad: f32) -> Self {
        self.rf_rad = rf_rad;
        self
    }

    pub fn with_descr_rad(mut self, descr_rad: f32) -> Self {
        self.descr_rad = descr_rad;
        self
    }

    pub fn with_cg_size(mut self, cg_size: f32) -> Self {
        self.cg_size = cg_size;
        self
    }

    pub fn with_cg_thresh(mut self, cg_thresh: f32) -> Self {
        self.cg_thresh = cg_thresh;
        self
    }

    pub fn with_normal_k(mut self, normal_k: usize) -> Self {
        self.normal_k = normal_k;
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: Point3f) -> Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn with_min_frame_support(mut self, min_frame_support: usize) -> Self {
        self.min_frame_support = min_frame_support;
        self
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.use_interpolation = enabled;
        self
    }

    pub fn with_distance_weight(mut self, enabled: bool) -> Self {
        self.use_distance_weight = enabled;
        self
    }

    pub fn with_match_threshold(mut self, match_threshold: f32) -> Self {
        self.match_threshold = match_threshold;
        self
    }

    pub fn with_rejection_iterations(mut self, iterations: usize) -> Self {
        self.rejection_iterations = iterations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Check every field, failing on the first invalid one
    pub fn validate(&self) -> Result<()> {
        let radii = [
            ("model_ss", self.model_ss),
            ("scene_ss", self.scene_ss),
            ("rf_rad", self.rf_rad),
            ("descr_rad", self.descr_rad),
            ("cg_size", self.cg_size),
            ("cg_thresh", self.cg_thresh),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::InvalidConfig(format!("{} must be positive and finite, got {}", name, value)));
            }
        }

        if self.normal_k < 3 {
            return Err(Error::InvalidConfig(format!("normal_k must be at least 3, got {}", self.normal_k)));
        }
        if !is_finite_point(&self.viewpoint) {
            return Err(Error::InvalidConfig("viewpoint must be finite".to_string()));
        }
        if self.min_frame_support < 3 {
            return Err(Error::InvalidConfig(format!(
                "min_frame_support must be at least 3, got {}",
                self.min_frame_support
            )));
        }
        if !(self.match_threshold > 0.0 && self.match_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "match_threshold must lie in (0, 1], got {}",
                self.match_threshold
            )));
        }
        if self.rejection_iterations == 0 {
            return Err(Error::InvalidConfig("rejection_iterations must be positive".to_string()));
        }
        if self.num_threads == Some(0) {
            return Err(Error::InvalidConfig("num_threads must be positive".to_string()));
        }

        Ok(())
    }

    /// Convert the radii to absolute lengths for a cloud of the given
    /// resolution.
    ///
    /// A zero (or non-finite) resolution keeps the radii at their literal
    /// values.
    pub fn scaled(&self, resolution: f32) -> RecognitionParameters {
        let usable = resolution.is_finite() && resolution > 0.0;
        if !usable {
            log::warn!(
                "Cloud resolution is {}; using radii as absolute lengths",
                resolution
            );
        }
        let factor = if usable { resolution } else { 1.0 };

        RecognitionParameters {
            resolution: if usable { resolution } else { 0.0 },
            model_ss: self.model_ss * factor,
            scene_ss: self.scene_ss * factor,
            rf_rad: self.rf_rad * factor,
            descr_rad: self.descr_rad * factor,
            cg_size: self.cg_size * factor,
            cg_thresh: self.cg_thresh,
        }
    }
}

/// Absolute parameters of one recognition run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecognitionParameters {
    /// Model cloud resolution the radii were scaled by (0 when unscaled)
    pub resolution: f32,
    pub model_ss: f32,
    pub scene_ss: f32,
    pub rf_rad: f32,
    pub descr_rad: f32,
    pub cg_size: f32,
    pub cg_thresh: f32,
}

impl RecognitionParameters {
    pub fn is_scaled(&self) -> bool {
        self.resolution > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_config() {
        let config = RecognitionConfig::default();
        assert_eq!(config.model_ss, 10.0);
        assert_eq!(config.scene_ss, 30.0);
        assert_eq!(config.rf_rad, 15.0);
        assert_eq!(config.descr_rad, 20.0);
        assert_eq!(config.cg_size, 10.0);
        assert_eq!(config.cg_thresh, 5.0);
        assert_eq!(config.normal_k, 10);
        assert!(config.use_interpolation);
        assert!(!config.use_distance_weight);
        assert_eq!(config.match_threshold, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scaling_leaves_threshold_alone() {
        let parameters = RecognitionConfig::default().scaled(0.5);
        assert!(parameters.is_scaled());
        assert_relative_eq!(parameters.model_ss, 5.0);
        assert_relative_eq!(parameters.scene_ss, 15.0);
        assert_relative_eq!(parameters.rf_rad, 7.5);
        assert_relative_eq!(parameters.descr_rad, 10.0);
        assert_relative_eq!(parameters.cg_size, 5.0);
        assert_eq!(parameters.cg_thresh, 5.0);
    }

    #[test]
    fn test_zero_resolution_keeps_literal_radii() {
        let parameters = RecognitionConfig::default().scaled(0.0);
        assert!(!parameters.is_scaled());
        assert_eq!(parameters.model_ss, 10.0);
        assert_eq!(parameters.cg_size, 10.0);
        assert_eq!(parameters.cg_thresh, 5.0);
    }

    #[test]
    fn test_validation_fails_fast() {
        let base = RecognitionConfig::default();
        assert!(matches!(base.clone().with_rf_rad(0.0).validate(), Err(Error::InvalidConfig(_))));
        assert!(base.clone().with_cg_size(-1.0).validate().is_err());
        assert!(base.clone().with_descr_rad(f32::NAN).validate().is_err());
        assert!(base.clone().with_cg_thresh(0.0).validate().is_err());
        assert!(base.clone().with_normal_k(2).validate().is_err());
        assert!(base.clone().with_min_frame_support(1).validate().is_err());
        assert!(base.clone().with_match_threshold(1.5).validate().is_err());
        assert!(base.clone().with_rejection_iterations(0).validate().is_err());
        assert!(base.clone().with_threads(0).validate().is_err());
        assert!(base.with_viewpoint(Point3f::new(f32::NAN, 0.0, 0.0)).validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = RecognitionConfig::default()
            .with_model_ss(2.0)
            .with_scene_ss(3.0)
            .with_interpolation(false)
            .with_distance_weight(true)
            .with_seed(7)
            .with_threads(2);
        assert_eq!(config.model_ss, 2.0);
        assert_eq!(config.scene_ss, 3.0);
        assert!(!config.use_interpolation);
        assert!(config.use_distance_weight);
        assert_eq!(config.seed, 7);
        assert_eq!(config.num_threads, Some(2));
    }
}
