//! Find instances of a model in a scene by correspondence grouping.
//!
//! # Usage
//!
//! ```bash
//! correspondence_grouping model.pcd scene.pcd --cg-size 10 --cg-thresh 5 --output-dir out/
//! ```
//!
//! Radii are given as multiples of the model's cloud resolution. With
//! `--output-dir` every recognized instance is written as `instance_<n>.pcd`,
//! the model moved into the scene by the recovered pose.

use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use posecrate_algorithms::{RecognitionConfig, RecognitionPipeline, RecognitionResult};
use posecrate_core::{ColoredPoint3f, PointCloud};
use posecrate_io::{read_colored_point_cloud, write_pcd, PcdWriteOptions};

/// Color given to model instances written to disk
const INSTANCE_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Parser)]
#[command(name = "correspondence_grouping")]
#[command(about = "Recognize a model in a scene with SHOT descriptors and Hough voting")]
struct Args {
    /// Model point cloud (PCD)
    model: PathBuf,

    /// Scene point cloud (PCD)
    scene: PathBuf,

    /// Model uniform sampling radius, in resolution units
    #[arg(long)]
    model_ss: Option<f32>,

    /// Scene uniform sampling radius, in resolution units
    #[arg(long)]
    scene_ss: Option<f32>,

    /// Local reference frame support radius, in resolution units
    #[arg(long)]
    rf_rad: Option<f32>,

    /// SHOT descriptor radius, in resolution units
    #[arg(long)]
    descr_rad: Option<f32>,

    /// Hough bin size, in resolution units
    #[arg(long)]
    cg_size: Option<f32>,

    /// Minimum vote weight of a recognized instance
    #[arg(long)]
    cg_thresh: Option<f32>,

    /// Neighbors used for normal estimation
    #[arg(long)]
    normal_k: Option<usize>,

    /// Worker threads (default: all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Vote into a single bin instead of spreading over neighbors
    #[arg(long)]
    no_interpolation: bool,

    /// Weight votes by descriptor similarity
    #[arg(long)]
    distance_weight: bool,

    /// Directory for transformed model instances
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl Args {
    fn config(&self) -> RecognitionConfig {
        let mut config = RecognitionConfig::default()
            .with_interpolation(!self.no_interpolation)
            .with_distance_weight(self.distance_weight);

        if let Some(v) = self.model_ss {
            config = config.with_model_ss(v);
        }
        if let Some(v) = self.scene_ss {
            config = config.with_scene_ss(v);
        }
        if let Some(v) = self.rf_rad {
            config = config.with_rf_rad(v);
        }
        if let Some(v) = self.descr_rad {
            config = config.with_descr_rad(v);
        }
        if let Some(v) = self.cg_size {
            config = config.with_cg_size(v);
        }
        if let Some(v) = self.cg_thresh {
            config = config.with_cg_thresh(v);
        }
        if let Some(v) = self.normal_k {
            config = config.with_normal_k(v);
        }
        if let Some(v) = self.threads {
            config = config.with_threads(v);
        }
        config
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let model = read_colored_point_cloud(&args.model)
        .with_context(|| format!("Failed to load model cloud {}", args.model.display()))?;
    let scene = read_colored_point_cloud(&args.scene)
        .with_context(|| format!("Failed to load scene cloud {}", args.scene.display()))?;

    let pipeline = RecognitionPipeline::new(args.config()).context("Invalid recognition parameters")?;
    let result = pipeline
        .run(&model.positions(), &scene.positions())
        .context("Recognition failed")?;

    print!("{}", format_report(&result));

    if let Some(dir) = &args.output_dir {
        write_instances(&model, &result, dir)?;
    }

    Ok(())
}

/// Human-readable summary of one run
fn format_report(result: &RecognitionResult) -> String {
    let mut report = String::new();
    // Writing into a String cannot fail
    let _ = write_report(&mut report, result);
    report
}

fn write_report(out: &mut String, result: &RecognitionResult) -> fmt::Result {
    let parameters = &result.parameters;
    writeln!(out, "Model resolution:       {}", parameters.resolution)?;
    writeln!(out, "Model sampling size:    {}", parameters.model_ss)?;
    writeln!(out, "Scene sampling size:    {}", parameters.scene_ss)?;
    writeln!(out, "LRF support radius:     {}", parameters.rf_rad)?;
    writeln!(out, "SHOT descriptor radius: {}", parameters.descr_rad)?;
    writeln!(out, "Clustering bin size:    {}", parameters.cg_size)?;
    writeln!(out)?;
    writeln!(out, "Model keypoints: {}", result.model_keypoints.len())?;
    writeln!(out, "Scene keypoints: {}", result.scene_keypoints.len())?;
    writeln!(out, "Correspondences found: {}", result.correspondences.len())?;
    writeln!(out)?;

    let timings = &result.timings;
    let stages = [
        ("spatial index", timings.indexing),
        ("cloud resolution", timings.resolution),
        ("compute normals", timings.normals),
        ("uniform sampling", timings.keypoints),
        ("reference frames", timings.frames),
        ("SHOT descriptors", timings.descriptors),
        ("correspondences", timings.matching),
        ("clustering", timings.clustering),
        ("total", timings.total),
    ];
    for (stage, elapsed) in stages {
        writeln!(out, "{:>18}: {:.3} ms", stage, elapsed.as_secs_f64() * 1000.0)?;
    }
    writeln!(out)?;
    writeln!(out, "Model instances found: {}", result.instance_count())?;

    for (i, hypothesis) in result.hypotheses.iter().enumerate() {
        let transform = hypothesis.to_transform();
        let r = transform.rotation_matrix();
        let t = transform.translation_vector();
        writeln!(out)?;
        writeln!(out, "    Instance {}:", i + 1)?;
        writeln!(
            out,
            "        Correspondences belonging to this instance: {}",
            hypothesis.correspondences.len()
        )?;
        writeln!(out)?;
        writeln!(out, "            | {:6.3} {:6.3} {:6.3} | ", r[(0, 0)], r[(0, 1)], r[(0, 2)])?;
        writeln!(out, "        R = | {:6.3} {:6.3} {:6.3} | ", r[(1, 0)], r[(1, 1)], r[(1, 2)])?;
        writeln!(out, "            | {:6.3} {:6.3} {:6.3} | ", r[(2, 0)], r[(2, 1)], r[(2, 2)])?;
        writeln!(out)?;
        writeln!(out, "        t = < {:0.3}, {:0.3}, {:0.3} >", t.x, t.y, t.z)?;
    }
    Ok(())
}

fn write_instances(model: &PointCloud<ColoredPoint3f>, result: &RecognitionResult, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    for (i, hypothesis) in result.hypotheses.iter().enumerate() {
        let instance = model.transformed_with_color(&hypothesis.to_transform(), INSTANCE_COLOR);
        let path = dir.join(format!("instance_{}.pcd", i + 1));
        write_pcd(&instance, &path, &PcdWriteOptions::default())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Wrote {}", path.display());
    }

    Ok(())
}
