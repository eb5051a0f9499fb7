//! Keypoint records

use crate::descriptor::ShotDescriptor;
use crate::frame::{FrameEstimate, LocalReferenceFrame};
use crate::point::{Point3f, Vector3f};
use serde::{Deserialize, Serialize};

/// Everything the pipeline knows about one keypoint.
///
/// Position, normal, frame and descriptor travel together so that no stage
/// has to keep parallel arrays aligned by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Index of the keypoint in the dense cloud it was sampled from
    pub source_index: usize,
    pub position: Point3f,
    /// Surface normal of the dense point, if one could be estimated
    pub normal: Option<Vector3f>,
    pub frame: FrameEstimate,
    /// Absent when the frame or normal is missing
    pub descriptor: Option<ShotDescriptor>,
}

impl Keypoint {
    /// A freshly sampled keypoint with nothing estimated yet
    pub fn new(source_index: usize, position: Point3f) -> Self {
        Self {
            source_index,
            position,
            normal: None,
            frame: FrameEstimate::Ambiguous,
            descriptor: None,
        }
    }

    pub fn local_frame(&self) -> Option<&LocalReferenceFrame> {
        self.frame.frame()
    }

    /// True when the keypoint may take part in descriptor matching
    pub fn is_matchable(&self) -> bool {
        self.frame.is_valid()
            && self.descriptor.as_ref().is_some_and(|d| d.is_finite())
    }
}
