//! End-to-end recognition pipeline
//!
//! Runs every stage from a pair of raw clouds to ranked pose hypotheses. Each
//! stage finishes completely before the next starts; within a stage the work
//! is spread over rayon workers.

use crate::config::{RecognitionConfig, RecognitionParameters};
use crate::correspondence::find_correspondences;
use crate::descriptors::ShotEstimator;
use crate::hough::HoughGrouping;
use crate::nearest_neighbor::SpatialIndex;
use crate::normals::estimate_normals_with_index;
use crate::reference_frame::FrameEstimator;
use crate::resolution::cloud_resolution_with_index;
use crate::sampling::uniform_sampling_with_index;
use posecrate_core::{Correspondence, Error, Keypoint, Point3f, PointCloud, PoseHypothesis, Result, Vector3f};
use rayon::ThreadPoolBuilder;
use std::time::{Duration, Instant};

/// Wall time spent in each stage of one run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTimings {
    pub indexing: Duration,
    pub resolution: Duration,
    pub normals: Duration,
    pub keypoints: Duration,
    pub frames: Duration,
    pub descriptors: Duration,
    pub matching: Duration,
    pub clustering: Duration,
    pub total: Duration,
}

/// Everything one recognition run produced
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    /// Absolute parameters the run used
    pub parameters: RecognitionParameters,
    pub model_keypoints: Vec<Keypoint>,
    pub scene_keypoints: Vec<Keypoint>,
    pub correspondences: Vec<Correspondence>,
    /// Recognized instances, strongest first
    pub hypotheses: Vec<PoseHypothesis>,
    pub timings: StageTimings,
}

impl RecognitionResult {
    pub fn instance_count(&self) -> usize {
        self.hypotheses.len()
    }
}

/// Correspondence-grouping recognizer for one model
pub struct RecognitionPipeline {
    config: RecognitionConfig,
}

impl RecognitionPipeline {
    /// Create a pipeline; the configuration is checked before anything runs
    pub fn new(config: RecognitionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Find every instance of `model` in `scene`.
    ///
    /// With `num_threads` set the run happens on a dedicated pool of that
    /// size, otherwise on the rayon global pool.
    pub fn run(&self, model: &PointCloud<Point3f>, scene: &PointCloud<Point3f>) -> Result<RecognitionResult> {
        match self.config.num_threads {
            Some(num_threads) => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|index| format!("posecrate-{}", index))
                    .build()
                    .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))?;
                pool.install(|| self.run_stages(model, scene))
            }
            None => self.run_stages(model, scene),
        }
    }

    fn run_stages(&self, model: &PointCloud<Point3f>, scene: &PointCloud<Point3f>) -> Result<RecognitionResult> {
        let config = &self.config;
        let mut timings = StageTimings::default();
        let started = Instant::now();

        let stage = Instant::now();
        let model_index = SpatialIndex::from_cloud(model);
        let scene_index = SpatialIndex::from_cloud(scene);
        timings.indexing = stage.elapsed();

        let stage = Instant::now();
        let resolution = cloud_resolution_with_index(&model.points, &model_index);
        let parameters = config.scaled(resolution);
        timings.resolution = stage.elapsed();
        log::debug!("Model resolution: {}", resolution);
        log::debug!(
            "Model sampling size: {}, scene sampling size: {}, LRF support radius: {}, SHOT descriptor radius: {}, clustering bin size: {}",
            parameters.model_ss,
            parameters.scene_ss,
            parameters.rf_rad,
            parameters.descr_rad,
            parameters.cg_size
        );

        let stage = Instant::now();
        let model_normals = estimate_normals_with_index(&model.points, &model_index, config.normal_k, &config.viewpoint)?;
        let scene_normals = estimate_normals_with_index(&scene.points, &scene_index, config.normal_k, &config.viewpoint)?;
        timings.normals = stage.elapsed();

        let stage = Instant::now();
        let mut model_keypoints = sample_keypoints(&model.points, &model_index, &model_normals, parameters.model_ss)?;
        let mut scene_keypoints = sample_keypoints(&scene.points, &scene_index, &scene_normals, parameters.scene_ss)?;
        timings.keypoints = stage.elapsed();
        log::debug!(
            "Model total points: {}; selected keypoints: {}",
            model.len(),
            model_keypoints.len()
        );
        log::debug!(
            "Scene total points: {}; selected keypoints: {}",
            scene.len(),
            scene_keypoints.len()
        );

        let stage = Instant::now();
        let frames = FrameEstimator::new(parameters.rf_rad)?.with_min_support(config.min_frame_support);
        frames.compute(&mut model_keypoints, &model.points, &model_index);
        frames.compute(&mut scene_keypoints, &scene.points, &scene_index);
        timings.frames = stage.elapsed();
        log::debug!(
            "Valid frames: {}/{} model, {}/{} scene",
            model_keypoints.iter().filter(|k| k.frame.is_valid()).count(),
            model_keypoints.len(),
            scene_keypoints.iter().filter(|k| k.frame.is_valid()).count(),
            scene_keypoints.len()
        );

        let stage = Instant::now();
        let shot = ShotEstimator::new(parameters.descr_rad)?;
        shot.compute(&mut model_keypoints, &model.points, &model_normals, &model_index);
        shot.compute(&mut scene_keypoints, &scene.points, &scene_normals, &scene_index);
        timings.descriptors = stage.elapsed();

        let stage = Instant::now();
        let correspondences = find_correspondences(&model_keypoints, &scene_keypoints, config.match_threshold)?;
        timings.matching = stage.elapsed();
        log::debug!("Correspondences found: {}", correspondences.len());

        let stage = Instant::now();
        let hypotheses = HoughGrouping::new(parameters.cg_size, parameters.cg_thresh)?
            .with_interpolation(config.use_interpolation)
            .with_distance_weight(config.use_distance_weight)
            .with_rejection_iterations(config.rejection_iterations)
            .with_seed(config.seed)
            .recognize(&model_keypoints, &scene_keypoints, &correspondences)?;
        timings.clustering = stage.elapsed();
        log::debug!("Model instances found: {}", hypotheses.len());

        timings.total = started.elapsed();
        log::debug!("Stage timings: {:?}", timings);

        Ok(RecognitionResult {
            parameters,
            model_keypoints,
            scene_keypoints,
            correspondences,
            hypotheses,
            timings,
        })
    }
}

fn sample_keypoints(
    points: &[Point3f],
    index: &SpatialIndex,
    normals: &[Option<Vector3f>],
    radius: f32,
) -> Result<Vec<Keypoint>> {
    let indices = uniform_sampling_with_index(points, index, radius)?;
    Ok(indices
        .into_iter()
        .map(|i| {
            let mut keypoint = Keypoint::new(i, points[i]);
            keypoint.normal = normals[i];
            keypoint
        })
        .collect())
}

/// Run the full pipeline once with the given configuration
pub fn recognize(
    model: &PointCloud<Point3f>,
    scene: &PointCloud<Point3f>,
    config: RecognitionConfig,
) -> Result<RecognitionResult> {
    RecognitionPipeline::new(config)?.run(model, scene)
}
