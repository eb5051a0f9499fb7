//! Correspondences and pose hypotheses

use crate::transform::Transform3D;
use nalgebra::{Isometry3, Matrix4};
use serde::{Deserialize, Serialize};

/// A candidate match between a model keypoint and a scene keypoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Index into the model keypoint set
    pub model_index: usize,
    /// Index into the scene keypoint set
    pub scene_index: usize,
    /// Squared descriptor distance
    pub distance: f32,
}

impl Correspondence {
    pub fn new(model_index: usize, scene_index: usize, distance: f32) -> Self {
        Self {
            model_index,
            scene_index,
            distance,
        }
    }
}

/// One recognized model instance: the rigid transform mapping the model onto
/// the scene, and the correspondences that support it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseHypothesis {
    pub transform: Isometry3<f32>,
    pub correspondences: Vec<Correspondence>,
    /// Accumulated vote weight of the Hough bin the instance came from
    pub votes: f32,
}

impl PoseHypothesis {
    /// Homogeneous 4x4 form of the transform
    pub fn matrix(&self) -> Matrix4<f32> {
        self.transform.to_homogeneous()
    }

    pub fn to_transform(&self) -> Transform3D {
        Transform3D::from(self.transform)
    }
}
