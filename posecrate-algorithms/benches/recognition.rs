//! Benchmarks for the recognition pipeline and its heaviest stages

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use posecrate_algorithms::{
    compute_cloud_resolution, estimate_normals, recognize, uniform_sampling, RecognitionConfig,
};
use posecrate_core::{Point3f, PointCloud};

fn generate_terrain(size: usize) -> PointCloud<Point3f> {
    let mut cloud = PointCloud::with_capacity(size * size);
    for i in 0..size {
        for j in 0..size {
            let x = i as f32 / (size - 1) as f32;
            let y = j as f32 / (size - 1) as f32;
            let z = 0.3 * (2.1 * x + 0.4).sin() * (1.7 * y).cos() + 0.15 * x * x * y;
            cloud.push(Point3f::new(x, y, z));
        }
    }
    cloud
}

fn quarter_turn(cloud: &PointCloud<Point3f>) -> PointCloud<Point3f> {
    cloud.iter().map(|p| Point3f::new(1.0 - p.y, p.x, p.z)).collect()
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stages");

    for &size in &[33, 65] {
        let cloud = generate_terrain(size);
        let points = cloud.len();

        group.bench_with_input(BenchmarkId::new("resolution", points), &cloud, |b, cloud| {
            b.iter(|| black_box(compute_cloud_resolution(black_box(cloud))));
        });

        group.bench_with_input(BenchmarkId::new("normals", points), &cloud, |b, cloud| {
            let viewpoint = Point3f::new(0.5, 0.5, 10.0);
            b.iter(|| black_box(estimate_normals(black_box(cloud), 10, &viewpoint).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("uniform_sampling", points), &cloud, |b, cloud| {
            let radius = 2.5 / (size - 1) as f32;
            b.iter(|| black_box(uniform_sampling(black_box(cloud), radius).unwrap()));
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);

    let config = RecognitionConfig::default()
        .with_model_ss(2.5)
        .with_scene_ss(2.5)
        .with_rf_rad(6.0)
        .with_descr_rad(6.0)
        .with_cg_size(2.0)
        .with_cg_thresh(3.0)
        .with_viewpoint(Point3f::new(0.5, 0.5, 10.0));

    for &size in &[17, 33] {
        let model = generate_terrain(size);
        let scene = quarter_turn(&model);

        group.bench_with_input(
            BenchmarkId::new("recognize", model.len()),
            &(&model, &scene),
            |b, &(model, scene)| {
                b.iter(|| black_box(recognize(black_box(model), black_box(scene), config.clone()).unwrap()));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_stages, bench_pipeline);
criterion_main!(benches);
