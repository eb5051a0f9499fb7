//! SHOT local shape descriptors

use serde::{Deserialize, Serialize};

/// Number of azimuth sectors of the SHOT support sphere
pub const SHOT_AZIMUTH_BINS: usize = 8;
/// Number of elevation sectors of the SHOT support sphere
pub const SHOT_ELEVATION_BINS: usize = 2;
/// Number of radial shells of the SHOT support sphere
pub const SHOT_RADIAL_BINS: usize = 2;
/// Number of normal-cosine bins in each spatial volume
pub const SHOT_COSINE_BINS: usize = 11;
/// Total descriptor length (32 volumes x 11 bins)
pub const SHOT_DESCRIPTOR_LEN: usize =
    SHOT_AZIMUTH_BINS * SHOT_ELEVATION_BINS * SHOT_RADIAL_BINS * SHOT_COSINE_BINS;

/// Value written to every entry of a descriptor whose support held no usable
/// neighbor. It is non-finite, so such descriptors never take part in matching.
pub const NO_NEIGHBOR_FILL: f32 = f32::NAN;

/// A fixed-length (352) local shape signature.
///
/// Valid descriptors are non-negative and L2-normalized, which bounds
/// [`ShotDescriptor::distance_squared`] to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotDescriptor {
    values: Vec<f32>,
}

impl ShotDescriptor {
    /// All-zero histogram, the starting point for accumulation
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; SHOT_DESCRIPTOR_LEN],
        }
    }

    /// Descriptor of a keypoint without usable neighbors
    pub fn no_neighbors() -> Self {
        Self {
            values: vec![NO_NEIGHBOR_FILL; SHOT_DESCRIPTOR_LEN],
        }
    }

    /// Build from raw values; the slice must hold exactly 352 entries
    pub fn from_values(values: Vec<f32>) -> Option<Self> {
        (values.len() == SHOT_DESCRIPTOR_LEN).then_some(Self { values })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// True when every entry is finite
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Scale to unit L2 norm. Returns false (leaving the values untouched)
    /// when the histogram is empty.
    pub fn normalize(&mut self) -> bool {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= f32::EPSILON || !norm.is_finite() {
            return false;
        }
        for v in &mut self.values {
            *v /= norm;
        }
        true
    }

    /// Squared descriptor distance: half the squared Euclidean distance.
    pub fn distance_squared(&self, other: &ShotDescriptor) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            * 0.5
    }
}
