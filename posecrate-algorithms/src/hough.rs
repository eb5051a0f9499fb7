//! Hough voting correspondence grouping
//!
//! Every correspondence between two keypoints with valid local reference
//! frames predicts where the model's reference point lies in the scene. True
//! correspondences of one model instance agree on that prediction, so their
//! votes pile up in the same cell of a sparse 3D accumulator. Each cell that
//! collects enough weight becomes a cluster, which is cleaned with RANSAC and
//! turned into a rigid pose.

use crate::registration::reject_correspondences_ransac;
use posecrate_core::{
    is_finite_point, Correspondence, Error, Keypoint, Point3f, PoseHypothesis, Result, Vector3f,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashMap;

/// Votes handled by one partial accumulator
pub const VOTE_CHUNK: usize = 256;

/// Integer coordinates of an accumulator cell
pub type BinKey = [i32; 3];

#[derive(Debug, Clone, Copy)]
struct Vote {
    /// Position of the correspondence in the input slice
    correspondence: usize,
    position: Point3f,
    weight: f32,
}

#[derive(Debug, Clone)]
struct Bin {
    weight: f32,
    /// Correspondence positions, ascending
    voters: Vec<usize>,
}

impl Bin {
    fn first_voter(&self) -> usize {
        self.voters.first().copied().unwrap_or(usize::MAX)
    }
}

type Accumulator = HashMap<BinKey, Bin>;

/// Centroid of the finite model keypoint positions
pub fn reference_point(keypoints: &[Keypoint]) -> Option<Point3f> {
    let (sum, count) = keypoints
        .iter()
        .filter(|k| is_finite_point(&k.position))
        .fold((Vector3f::zeros(), 0usize), |(sum, count), k| (sum + k.position.coords, count + 1));
    (count > 0).then(|| Point3f::from(sum / count as f32))
}

/// Groups correspondences into model instances by 3D Hough voting.
///
/// # Example
/// ```rust
/// use posecrate_algorithms::HoughGrouping;
///
/// let grouping = HoughGrouping::new(0.01, 5.0)
///     .unwrap()
///     .with_interpolation(true)
///     .with_seed(42);
/// assert_eq!(grouping.bin_size(), 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct HoughGrouping {
    bin_size: f32,
    threshold: f32,
    use_interpolation: bool,
    use_distance_weight: bool,
    rejection_iterations: usize,
    seed: u64,
}

impl HoughGrouping {
    pub fn new(bin_size: f32, threshold: f32) -> Result<Self> {
        if !bin_size.is_finite() || bin_size <= 0.0 {
            return Err(Error::InvalidData("Bin size must be positive and finite".to_string()));
        }
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(Error::InvalidData("Cluster threshold must be positive and finite".to_string()));
        }
        Ok(Self {
            bin_size,
            threshold,
            use_interpolation: true,
            use_distance_weight: false,
            rejection_iterations: crate::config::DEFAULT_REJECTION_ITERATIONS,
            seed: crate::config::DEFAULT_SEED,
        })
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.use_interpolation = enabled;
        self
    }

    pub fn with_distance_weight(mut self, enabled: bool) -> Self {
        self.use_distance_weight = enabled;
        self
    }

    pub fn with_rejection_iterations(mut self, iterations: usize) -> Self {
        self.rejection_iterations = iterations.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn bin_size(&self) -> f32 {
        self.bin_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Find model instances among the correspondences.
    ///
    /// Hypotheses come out strongest bin first. Correspondences referring to
    /// keypoints outside the given slices are an error; those whose keypoints
    /// lack a valid frame are ignored.
    ///
    /// # Arguments
    /// * `model` - Model keypoints with frames
    /// * `scene` - Scene keypoints with frames
    /// * `correspondences` - Matches between the two keypoint sets
    ///
    /// # Returns
    /// * `Result<Vec<PoseHypothesis>>` - One hypothesis per accepted cluster
    pub fn recognize(
        &self,
        model: &[Keypoint],
        scene: &[Keypoint],
        correspondences: &[Correspondence],
    ) -> Result<Vec<PoseHypothesis>> {
        if let Some(bad) = correspondences
            .iter()
            .find(|c| c.model_index >= model.len() || c.scene_index >= scene.len())
        {
            return Err(Error::InvalidData(format!(
                "Correspondence ({}, {}) is out of range for {} model and {} scene keypoints",
                bad.model_index,
                bad.scene_index,
                model.len(),
                scene.len()
            )));
        }

        let Some(reference) = reference_point(model) else {
            return Ok(Vec::new());
        };

        let votes = self.cast_votes(model, scene, correspondences, &reference);
        let accumulator = self.accumulate(&votes);
        let clusters = self.select_bins(accumulator);
        log::debug!(
            "Hough voting: {} votes, {} clusters above threshold {}",
            votes.len(),
            clusters.len(),
            self.threshold
        );

        let hypotheses: Vec<Option<PoseHypothesis>> = clusters
            .par_iter()
            .enumerate()
            .map(|(rank, (key, bin))| -> Result<Option<PoseHypothesis>> {
                let source: Vec<Point3f> = bin
                    .voters
                    .iter()
                    .map(|&i| model[correspondences[i].model_index].position)
                    .collect();
                let target: Vec<Point3f> = bin
                    .voters
                    .iter()
                    .map(|&i| scene[correspondences[i].scene_index].position)
                    .collect();

                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(rank as u64));
                let rejection = reject_correspondences_ransac(
                    &source,
                    &target,
                    self.bin_size,
                    self.rejection_iterations,
                    &mut rng,
                )?;

                match rejection {
                    Some(rejection) => Ok(Some(PoseHypothesis {
                        transform: rejection.transform,
                        correspondences: rejection
                            .inliers
                            .iter()
                            .map(|&i| correspondences[bin.voters[i]])
                            .collect(),
                        votes: bin.weight,
                    })),
                    None => {
                        log::debug!(
                            "Rejected cluster {:?}: {} voters without a consistent rigid motion",
                            key,
                            bin.voters.len()
                        );
                        Ok(None)
                    }
                }
            })
            .collect::<Result<_>>()?;

        Ok(hypotheses.into_iter().flatten().collect())
    }

    /// One vote per correspondence whose keypoints both carry a valid frame.
    ///
    /// The model-side offset to the reference point is expressed in the model
    /// keypoint's frame, then carried into the scene through the scene
    /// keypoint's frame.
    fn cast_votes(
        &self,
        model: &[Keypoint],
        scene: &[Keypoint],
        correspondences: &[Correspondence],
        reference: &Point3f,
    ) -> Vec<Vote> {
        correspondences
            .par_iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let model_keypoint = &model[c.model_index];
                let scene_keypoint = &scene[c.scene_index];
                let model_frame = model_keypoint.local_frame()?;
                let scene_frame = scene_keypoint.local_frame()?;

                let local = model_frame.to_local(&(*reference - model_keypoint.position));
                let position = scene_keypoint.position + scene_frame.to_world(&local);
                if !is_finite_point(&position) {
                    return None;
                }

                let weight = if self.use_distance_weight {
                    (1.0 - c.distance).max(0.0)
                } else {
                    1.0
                };
                Some(Vote {
                    correspondence: i,
                    position,
                    weight,
                })
            })
            .collect()
    }

    /// Cells (with their share of the vote) a position contributes to
    fn bin_shares(&self, position: &Point3f) -> Vec<(BinKey, f32)> {
        let scaled = position.coords / self.bin_size;

        if !self.use_interpolation {
            let key = [
                scaled.x.floor() as i32,
                scaled.y.floor() as i32,
                scaled.z.floor() as i32,
            ];
            return vec![(key, 1.0)];
        }

        // Coordinates relative to the cell centers
        let axes: [[(i32, f32); 2]; 3] = [scaled.x, scaled.y, scaled.z].map(|s| {
            let u = s - 0.5;
            let lower = u.floor();
            let fraction = u - lower;
            [(lower as i32, 1.0 - fraction), (lower as i32 + 1, fraction)]
        });

        let mut shares = Vec::with_capacity(8);
        for &(x, wx) in &axes[0] {
            for &(y, wy) in &axes[1] {
                for &(z, wz) in &axes[2] {
                    let weight = wx * wy * wz;
                    if weight > 0.0 {
                        shares.push(([x, y, z], weight));
                    }
                }
            }
        }
        shares
    }

    /// Sum the votes into a sparse accumulator.
    ///
    /// Fixed-size chunks fill their own partial accumulators in parallel; the
    /// partials are then merged in chunk order, so the result does not depend
    /// on scheduling.
    fn accumulate(&self, votes: &[Vote]) -> Accumulator {
        let partials: Vec<Accumulator> = votes
            .par_chunks(VOTE_CHUNK)
            .map(|chunk| {
                let mut partial = Accumulator::new();
                for vote in chunk {
                    for (key, share) in self.bin_shares(&vote.position) {
                        let bin = partial.entry(key).or_insert_with(|| Bin {
                            weight: 0.0,
                            voters: Vec::new(),
                        });
                        bin.weight += share * vote.weight;
                        bin.voters.push(vote.correspondence);
                    }
                }
                partial
            })
            .collect();

        let mut merged = Accumulator::new();
        for partial in partials {
            for (key, bin) in partial {
                match merged.get_mut(&key) {
                    Some(existing) => {
                        existing.weight += bin.weight;
                        existing.voters.extend(bin.voters);
                    }
                    None => {
                        merged.insert(key, bin);
                    }
                }
            }
        }
        merged
    }

    /// Rank the bins above threshold and drop those adjacent to a stronger one
    fn select_bins(&self, accumulator: Accumulator) -> Vec<(BinKey, Bin)> {
        let mut candidates: Vec<(BinKey, Bin)> = accumulator
            .into_iter()
            .filter(|(_, bin)| bin.weight >= self.threshold)
            .collect();

        candidates.sort_by(|(key_a, a), (key_b, b)| {
            b.weight
                .total_cmp(&a.weight)
                .then(a.first_voter().cmp(&b.first_voter()))
                .then(key_a.cmp(key_b))
        });

        let mut accepted: Vec<(BinKey, Bin)> = Vec::new();
        for (key, bin) in candidates {
            let suppressed = accepted
                .iter()
                .any(|(other, _)| (0..3).all(|axis| (key[axis] - other[axis]).abs() <= 1));
            if !suppressed {
                accepted.push((key, bin));
            }
        }
        accepted
    }
}
