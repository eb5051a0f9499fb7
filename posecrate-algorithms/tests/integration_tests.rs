//! Integration tests for posecrate-algorithms
//!
//! These tests run the whole recognition pipeline on synthetic terrain
//! patches whose scene copy is produced by an exactly representable rigid
//! motion, so every stage sees the same neighborhoods in model and scene.

use approx::assert_relative_eq;
use nalgebra::{Matrix3, Vector3};
use posecrate_algorithms::*;
use posecrate_core::{Point3f, PointCloud};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Asymmetric height field sampled on a dyadic grid over the unit square
fn create_terrain() -> PointCloud<Point3f> {
    let mut cloud = PointCloud::new();
    for i in 0..=16 {
        for j in 0..=16 {
            let x = i as f32 / 16.0;
            let y = j as f32 / 16.0;
            let z = 0.3 * (2.1 * x + 0.4).sin() * (1.7 * y).cos() + 0.15 * x * x * y;
            cloud.push(Point3f::new(x, y, z));
        }
    }
    cloud
}

/// Quarter turn about z followed by a unit shift along x; exact on the grid
fn quarter_turn(cloud: &PointCloud<Point3f>) -> PointCloud<Point3f> {
    cloud.iter().map(|p| Point3f::new(1.0 - p.y, p.x, p.z)).collect()
}

/// Surface of the unit cube sampled on the same dyadic grid
fn create_cube_surface() -> PointCloud<Point3f> {
    let mut cloud = PointCloud::new();
    for i in 0..=16 {
        for j in 0..=16 {
            for k in 0..=16 {
                if [i, j, k].iter().any(|&c| c == 0 || c == 16) {
                    cloud.push(Point3f::new(i as f32 / 16.0, j as f32 / 16.0, k as f32 / 16.0));
                }
            }
        }
    }
    cloud
}

fn grid_key(point: &Point3f) -> [i32; 3] {
    [point.x, point.y, point.z].map(|c| (c * 16.0).round() as i32)
}

fn test_config() -> RecognitionConfig {
    RecognitionConfig::default()
        .with_model_ss(2.5)
        .with_scene_ss(2.5)
        .with_rf_rad(6.0)
        .with_descr_rad(6.0)
        .with_cg_size(2.0)
        .with_cg_thresh(3.0)
        .with_viewpoint(Point3f::new(0.5, 0.5, 10.0))
}

#[test]
fn test_recovers_known_transform() {
    let model = create_terrain();
    let scene = quarter_turn(&model);

    let result = recognize(&model, &scene, test_config()).unwrap();
    assert_relative_eq!(result.parameters.resolution, 1.0 / 16.0, epsilon = 0.01);
    assert!(!result.model_keypoints.is_empty());
    assert_eq!(result.model_keypoints.len(), result.scene_keypoints.len());
    assert!(result.correspondences.len() >= 10);

    assert_eq!(result.instance_count(), 1);
    let hypothesis = &result.hypotheses[0];

    let expected_rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    assert_relative_eq!(
        hypothesis.transform.rotation.to_rotation_matrix().into_inner(),
        expected_rotation,
        epsilon = 1e-3
    );
    assert_relative_eq!(
        hypothesis.transform.translation.vector,
        Vector3::new(1.0, 0.0, 0.0),
        epsilon = 1e-3
    );

    // Every true match ends up in the instance
    let true_matches = |correspondences: &[posecrate_core::Correspondence]| {
        correspondences
            .iter()
            .filter(|c| {
                result.model_keypoints[c.model_index].source_index
                    == result.scene_keypoints[c.scene_index].source_index
            })
            .count()
    };
    let total = true_matches(&result.correspondences);
    assert!(total >= 10);
    assert_eq!(true_matches(&hypothesis.correspondences), total);

    let matrix = hypothesis.matrix();
    assert_relative_eq!(matrix[(0, 3)], 1.0, epsilon = 1e-3);
    assert_eq!(matrix[(3, 3)], 1.0);
}

#[test]
fn test_correspondences_respect_threshold() {
    let model = create_terrain();
    let scene = quarter_turn(&model);
    let result = recognize(&model, &scene, test_config()).unwrap();

    let mut seen = std::collections::HashSet::new();
    for correspondence in &result.correspondences {
        assert!(correspondence.distance < MATCH_THRESHOLD);
        assert!(seen.insert(correspondence.scene_index));
    }
    assert!(result.correspondences.windows(2).all(|w| w[0].scene_index < w[1].scene_index));
}

#[test]
fn test_disjoint_scene_gives_at_most_one_instance() {
    let model = create_terrain();
    let mut rng = StdRng::seed_from_u64(99);
    let scene: PointCloud<Point3f> = (0..600)
        .map(|_| {
            Point3f::new(
                rng.gen_range(5.0..7.0),
                rng.gen_range(5.0..7.0),
                rng.gen_range(5.0..7.0),
            )
        })
        .collect();

    let result = recognize(&model, &scene, test_config()).unwrap();
    assert!(result.instance_count() <= 1);
}

#[test]
fn test_runs_are_idempotent() {
    let model = create_terrain();
    let scene = quarter_turn(&model);

    let first = recognize(&model, &scene, test_config()).unwrap();
    let second = recognize(&model, &scene, test_config()).unwrap();
    let bounded = recognize(&model, &scene, test_config().with_threads(1)).unwrap();

    for other in [&second, &bounded] {
        assert_eq!(first.parameters, other.parameters);
        assert_eq!(first.correspondences, other.correspondences);
        assert_eq!(first.hypotheses, other.hypotheses);
        let sources = |r: &RecognitionResult| r.scene_keypoints.iter().map(|k| k.source_index).collect::<Vec<_>>();
        assert_eq!(sources(&first), sources(other));
    }
}

#[test]
fn test_invalid_configuration_fails_before_running() {
    let model = create_terrain();
    let config = test_config().with_cg_size(-2.0);
    assert!(recognize(&model, &model, config).is_err());
    assert!(RecognitionPipeline::new(test_config().with_normal_k(1)).is_err());
}

#[test]
fn test_zero_resolution_falls_back_to_literal_radii() {
    let model = PointCloud::from_points(vec![Point3f::new(0.0, 0.0, 0.0)]);
    let scene = create_terrain();

    let result = recognize(&model, &scene, test_config()).unwrap();
    assert!(!result.parameters.is_scaled());
    assert_eq!(result.parameters.model_ss, 2.5);
    assert_eq!(result.parameters.cg_thresh, 3.0);
    assert!(result.hypotheses.is_empty());
}

#[test]
fn test_empty_clouds() {
    let empty = PointCloud::<Point3f>::new();
    let result = recognize(&empty, &empty, test_config()).unwrap();
    assert!(result.model_keypoints.is_empty());
    assert!(result.hypotheses.is_empty());
}

#[test]
fn test_non_finite_points_are_ignored() {
    let mut model = create_terrain();
    let mut scene = quarter_turn(&model);
    model.push(Point3f::new(f32::NAN, 0.0, 0.0));
    scene.push(Point3f::new(0.0, f32::INFINITY, 0.0));

    let result = recognize(&model, &scene, test_config()).unwrap();
    assert!(result
        .model_keypoints
        .iter()
        .all(|k| k.source_index < model.len() - 1));
    assert_eq!(result.instance_count(), 1);
}

#[test]
fn test_recognizes_quarter_turned_cube() {
    // The quarter turn plus unit shift maps the cube onto itself, so any
    // symmetry of the cube is an equally valid pose.
    let model = create_cube_surface();
    let scene = quarter_turn(&model);
    assert_eq!(model.len(), 17 * 17 * 17 - 15 * 15 * 15);

    let result = recognize(&model, &scene, test_config()).unwrap();
    assert_relative_eq!(result.parameters.resolution, 1.0 / 16.0, epsilon = 1e-4);
    assert_eq!(result.instance_count(), 1);
    let hypothesis = &result.hypotheses[0];

    let rotation = hypothesis.transform.rotation.to_rotation_matrix().into_inner();
    assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-4);

    // The pose carries every model point onto a scene point
    let scene_keys: std::collections::HashSet<[i32; 3]> = scene.iter().map(grid_key).collect();
    for point in model.iter() {
        let moved = hypothesis.transform * point;
        let key = grid_key(&moved);
        assert!(scene_keys.contains(&key), "{:?} left the cube", moved);
        let snapped = Point3f::new(key[0] as f32, key[1] as f32, key[2] as f32) / 16.0;
        assert_relative_eq!(moved, snapped, epsilon = 1e-3);
    }

    // Every supporting match agrees with the recovered pose
    let true_matches: Vec<_> = result
        .correspondences
        .iter()
        .filter(|c| {
            let model_position = result.model_keypoints[c.model_index].position;
            let scene_position = result.scene_keypoints[c.scene_index].position;
            (hypothesis.transform * model_position - scene_position).norm() < result.parameters.cg_size
        })
        .copied()
        .collect();
    assert!(hypothesis.correspondences.len() >= 10);
    assert!(true_matches.len() >= hypothesis.correspondences.len());
    assert!(hypothesis.correspondences.iter().all(|c| true_matches.contains(c)));
}
