//! Descriptor matching between model and scene keypoints

use posecrate_core::{Correspondence, Error, Keypoint, Result, ShotDescriptor};
use rayon::prelude::*;

/// Squared descriptor distance below which a match is accepted
pub const MATCH_THRESHOLD: f32 = 0.25;

/// Exhaustive nearest-neighbor search over finite descriptors.
///
/// At 352 dimensions a space-partitioning tree visits nearly every leaf, so
/// a linear scan is both simpler and no slower.
pub struct DescriptorIndex<'a> {
    entries: Vec<(usize, &'a ShotDescriptor)>,
}

impl<'a> DescriptorIndex<'a> {
    /// Index the descriptors of every matchable keypoint
    pub fn new(keypoints: &'a [Keypoint]) -> Self {
        let entries = keypoints
            .iter()
            .enumerate()
            .filter(|(_, keypoint)| keypoint.is_matchable())
            .filter_map(|(i, keypoint)| keypoint.descriptor.as_ref().map(|d| (i, d)))
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Closest indexed descriptor as `(keypoint_index, squared_distance)`;
    /// ties keep the lowest keypoint index.
    pub fn nearest(&self, query: &ShotDescriptor) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        for (index, descriptor) in &self.entries {
            let distance = descriptor.distance_squared(query);
            if !distance.is_finite() {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((*index, distance)),
            }
        }
        best
    }
}

/// Match every scene keypoint to its nearest model keypoint in descriptor
/// space.
///
/// A match is kept when its squared distance is strictly below `threshold`.
/// Scene keypoints without a finite descriptor or valid frame are skipped, so
/// each scene keypoint yields at most one correspondence. The output is
/// ordered by scene index.
///
/// # Arguments
/// * `model` - Model keypoints with descriptors
/// * `scene` - Scene keypoints with descriptors
/// * `threshold` - Acceptance threshold in `(0, 1]`
///
/// # Returns
/// * `Result<Vec<Correspondence>>` - Accepted matches
pub fn find_correspondences(model: &[Keypoint], scene: &[Keypoint], threshold: f32) -> Result<Vec<Correspondence>> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(Error::InvalidData("Match threshold must lie in (0, 1]".to_string()));
    }

    let index = DescriptorIndex::new(model);
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let correspondences = scene
        .par_iter()
        .enumerate()
        .filter_map(|(scene_index, keypoint)| {
            if !keypoint.is_matchable() {
                return None;
            }
            let descriptor = keypoint.descriptor.as_ref()?;
            let (model_index, distance) = index.nearest(descriptor)?;
            (distance < threshold).then(|| Correspondence::new(model_index, scene_index, distance))
        })
        .collect();

    Ok(correspondences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use posecrate_core::{FrameEstimate, LocalReferenceFrame, Point3f};

    fn keypoint_with(values: &[(usize, f32)]) -> Keypoint {
        let mut descriptor = ShotDescriptor::zeros();
        for &(i, v) in values {
            descriptor.as_mut_slice()[i] = v;
        }
        descriptor.normalize();
        let mut keypoint = Keypoint::new(0, Point3f::origin());
        keypoint.frame = FrameEstimate::Valid(LocalReferenceFrame::identity());
        keypoint.descriptor = Some(descriptor);
        keypoint
    }

    #[test]
    fn test_nearest_match_and_threshold() {
        let model = vec![
            keypoint_with(&[(0, 1.0)]),
            keypoint_with(&[(10, 1.0)]),
            keypoint_with(&[(20, 1.0)]),
        ];
        let scene = vec![
            keypoint_with(&[(10, 1.0), (11, 0.1)]),
            keypoint_with(&[(100, 1.0)]),
            keypoint_with(&[(20, 1.0)]),
        ];

        let correspondences = find_correspondences(&model, &scene, MATCH_THRESHOLD).unwrap();
        assert_eq!(correspondences.len(), 2);
        assert_eq!((correspondences[0].model_index, correspondences[0].scene_index), (1, 0));
        assert_eq!((correspondences[1].model_index, correspondences[1].scene_index), (2, 2));
        assert!(correspondences.iter().all(|c| c.distance < MATCH_THRESHOLD));
    }

    #[test]
    fn test_threshold_is_strict() {
        // Orthogonal unit descriptors are exactly 1 apart
        let model = vec![keypoint_with(&[(0, 1.0)])];
        let scene = vec![keypoint_with(&[(1, 1.0)])];
        assert!(find_correspondences(&model, &scene, 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_keep_lowest_model_index() {
        let model = vec![keypoint_with(&[(5, 1.0)]), keypoint_with(&[(5, 1.0)])];
        let scene = vec![keypoint_with(&[(5, 1.0)])];
        let correspondences = find_correspondences(&model, &scene, MATCH_THRESHOLD).unwrap();
        assert_eq!(correspondences[0].model_index, 0);
    }

    #[test]
    fn test_unmatchable_keypoints_are_skipped() {
        let mut filled = keypoint_with(&[]);
        filled.descriptor = Some(ShotDescriptor::no_neighbors());
        let mut frameless = keypoint_with(&[(3, 1.0)]);
        frameless.frame = FrameEstimate::Ambiguous;

        let model = vec![filled.clone(), keypoint_with(&[(3, 1.0)])];
        let scene = vec![filled, frameless, keypoint_with(&[(3, 1.0)])];

        let index = DescriptorIndex::new(&model);
        assert_eq!(index.len(), 1);

        let correspondences = find_correspondences(&model, &scene, MATCH_THRESHOLD).unwrap();
        assert_eq!(correspondences, vec![Correspondence::new(1, 2, 0.0)]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(find_correspondences(&[], &[keypoint_with(&[(0, 1.0)])], MATCH_THRESHOLD).unwrap().is_empty());
        assert!(find_correspondences(&[keypoint_with(&[(0, 1.0)])], &[], MATCH_THRESHOLD).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(find_correspondences(&[], &[], 0.0).is_err());
        assert!(find_correspondences(&[], &[], 1.5).is_err());
    }
}
