//! SHOT descriptor estimation

use itertools::iproduct;
use posecrate_core::{
    Error, Keypoint, LocalReferenceFrame, NearestNeighborSearch, Point3f, Result, ShotDescriptor, Vector3f,
    SHOT_AZIMUTH_BINS, SHOT_COSINE_BINS, SHOT_ELEVATION_BINS, SHOT_RADIAL_BINS,
};
use rayon::prelude::*;
use std::f32::consts::{FRAC_PI_2, PI, TAU};

/// Neighbors closer to the keypoint than this fraction of the radius are
/// treated as coincident and skipped.
const COINCIDENT_FRACTION: f32 = 1e-6;

/// A bin index paired with the share of a contribution it receives
type BinShare = (usize, f32);

/// Split a continuous bin coordinate between the two nearest bins, clamping
/// at both ends.
///
/// A coordinate exactly on a bin center gives its whole weight to that bin.
fn clamped_shares(u: f32, bins: usize) -> [BinShare; 2] {
    let last = (bins - 1) as f32;
    let u = u.clamp(0.0, last);
    let lower = u.floor();
    let fraction = u - lower;
    let lower = lower as usize;
    [(lower, 1.0 - fraction), ((lower + 1).min(bins - 1), fraction)]
}

/// Same as [`clamped_shares`] for a periodic dimension
fn wrapped_shares(u: f32, bins: usize) -> [BinShare; 2] {
    let lower = u.floor();
    let fraction = u - lower;
    let lower = (lower as i64).rem_euclid(bins as i64) as usize;
    [(lower, 1.0 - fraction), ((lower + 1) % bins, fraction)]
}

/// Position of a contribution in the 352-entry histogram
#[inline]
fn histogram_offset(radial: usize, elevation: usize, azimuth: usize, cosine: usize) -> usize {
    let volume = (radial * SHOT_ELEVATION_BINS + elevation) * SHOT_AZIMUTH_BINS + azimuth;
    volume * SHOT_COSINE_BINS + cosine
}

/// Computes SHOT descriptors: histograms of normal orientations over a
/// spherical grid aligned with the keypoint's local reference frame.
///
/// The support sphere is split into 8 azimuth, 2 elevation and 2 radial
/// sectors. Each sector holds an 11-bin histogram of the cosine between the
/// neighbor normal and the frame's z axis. Every contribution is spread
/// quadrilinearly over the neighboring bins of all four dimensions.
#[derive(Debug, Clone)]
pub struct ShotEstimator {
    radius: f32,
}

impl ShotEstimator {
    pub fn new(radius: f32) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(Error::InvalidData("Descriptor radius must be positive and finite".to_string()));
        }
        Ok(Self { radius })
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Describe the neighborhood of `position` as seen from `frame`.
    ///
    /// Returns the no-neighbor fill when nothing in the support contributes.
    pub fn describe<S>(
        &self,
        position: &Point3f,
        frame: &LocalReferenceFrame,
        points: &[Point3f],
        normals: &[Option<Vector3f>],
        index: &S,
    ) -> ShotDescriptor
    where
        S: NearestNeighborSearch,
    {
        let mut descriptor = ShotDescriptor::zeros();
        let histogram = descriptor.as_mut_slice();
        let coincident = COINCIDENT_FRACTION * self.radius;
        let mut usable = 0usize;

        for (i, distance_squared) in index.find_radius_neighbors(position, self.radius) {
            let distance = distance_squared.sqrt();
            if distance < coincident {
                continue;
            }
            let Some(normal) = normals.get(i).copied().flatten() else {
                continue;
            };

            let local = frame.to_local(&(points[i] - *position));
            let cosine = normal.dot(&frame.z_axis).clamp(-1.0, 1.0);
            let azimuth = local.y.atan2(local.x);
            let elevation = local.z.atan2((local.x * local.x + local.y * local.y).sqrt());

            let cosine_shares = clamped_shares((cosine + 1.0) * 0.5 * SHOT_COSINE_BINS as f32 - 0.5, SHOT_COSINE_BINS);
            let azimuth_shares = wrapped_shares((azimuth + PI) / TAU * SHOT_AZIMUTH_BINS as f32 - 0.5, SHOT_AZIMUTH_BINS);
            let elevation_shares = clamped_shares(
                (elevation + FRAC_PI_2) / PI * SHOT_ELEVATION_BINS as f32 - 0.5,
                SHOT_ELEVATION_BINS,
            );
            let radial_shares = clamped_shares(
                distance / self.radius * SHOT_RADIAL_BINS as f32 - 0.5,
                SHOT_RADIAL_BINS,
            );

            for ((r, wr), (e, we), (a, wa), (c, wc)) in
                iproduct!(radial_shares, elevation_shares, azimuth_shares, cosine_shares)
            {
                let weight = wr * we * wa * wc;
                if weight > 0.0 {
                    histogram[histogram_offset(r, e, a, c)] += weight;
                }
            }
            usable += 1;
        }

        if usable == 0 || !descriptor.normalize() {
            return ShotDescriptor::no_neighbors();
        }
        descriptor
    }

    /// Fill in the descriptor of every keypoint.
    ///
    /// Keypoints without a valid frame or without a normal get no descriptor.
    pub fn compute<S>(&self, keypoints: &mut [Keypoint], points: &[Point3f], normals: &[Option<Vector3f>], index: &S)
    where
        S: NearestNeighborSearch + Sync,
    {
        keypoints.par_iter_mut().for_each(|keypoint| {
            keypoint.descriptor = match (keypoint.frame.frame(), keypoint.normal) {
                (Some(frame), Some(_)) => Some(self.describe(&keypoint.position, frame, points, normals, index)),
                _ => None,
            };
        });
    }
}
