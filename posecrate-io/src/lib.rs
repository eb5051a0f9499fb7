//! I/O operations for point clouds
//!
//! This crate reads and writes the PCD format used for recognition inputs
//! and outputs. Clouds are loaded with their colors; the recognition stages
//! only need positions, which [`read_point_cloud`] extracts.

pub mod pcd;

pub use pcd::{
    read_pcd, read_pcd_data, write_pcd, PcdDataFormat, PcdField, PcdFieldType, PcdHeader, PcdReader,
    PcdValue, PcdWriteOptions, PcdWriter,
};

use posecrate_core::{ColoredPoint3f, Error, Point3f, PointCloud, Result};
use std::path::Path;

/// Trait for reading colored point clouds from files
pub trait PointCloudReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>>;
}

/// Trait for writing colored point clouds to files
pub trait PointCloudWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<ColoredPoint3f>, path: P) -> Result<()>;
}

impl PointCloudReader for PcdReader {
    fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
        PcdReader::read_file(path)
    }
}

impl PointCloudWriter for PcdWriter {
    fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<ColoredPoint3f>, path: P) -> Result<()> {
        PcdWriter::write_file(cloud, path, &PcdWriteOptions::default())
    }
}

/// Auto-detect format and read a colored point cloud
pub fn read_colored_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
    let path = path.as_ref();
    let cloud = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pcd") => PcdReader::read_point_cloud(path)?,
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "Unsupported point cloud format: {:?}",
                path.extension()
            )))
        }
    };
    log::debug!("Loaded {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

/// Auto-detect format and read point positions
pub fn read_point_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud<Point3f>> {
    Ok(read_colored_point_cloud(path)?.positions())
}

/// Auto-detect format and write a colored point cloud
pub fn write_point_cloud<P: AsRef<Path>>(cloud: &PointCloud<ColoredPoint3f>, path: P) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pcd") => PcdWriter::write_point_cloud(cloud, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported point cloud format: {:?}",
            path.extension()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    #[test]
    fn test_pcd_file_roundtrip() {
        let temp_file = std::env::temp_dir().join(format!("posecrate_roundtrip_{}.pcd", std::process::id()));

        let cloud: PointCloud<ColoredPoint3f> = vec![
            ColoredPoint3f::new(Point3f::new(0.0, 0.0, 0.0), [255, 0, 0]),
            ColoredPoint3f::new(Point3f::new(1.0, 0.0, 0.0), [0, 255, 0]),
            ColoredPoint3f::from(Point3f::new(0.0, 1.0, 0.5)),
        ]
        .into_iter()
        .collect();

        write_point_cloud(&cloud, &temp_file).unwrap();
        let loaded = read_colored_point_cloud(&temp_file).unwrap();
        let positions = read_point_cloud(&temp_file).unwrap();
        let _ = fs::remove_file(&temp_file);

        assert_eq!(loaded, cloud);
        assert_eq!(positions.len(), 3);
        assert_relative_eq!(positions[2].z, 0.5);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            read_point_cloud("cloud.ply"),
            Err(Error::UnsupportedFormat(_))
        ));
        let cloud = PointCloud::<ColoredPoint3f>::new();
        assert!(matches!(
            write_point_cloud(&cloud, "cloud.xyz"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(read_point_cloud("/nonexistent/posecrate.pcd"), Err(Error::Io(_))));
    }
}
