//! PCD (Point Cloud Data) format support
//!
//! Reads ASCII and binary PCD files into colored point clouds and writes
//! them back out. Only the `x`, `y`, `z` fields and a packed `rgb`/`rgba`
//! field are interpreted; other fields are parsed and skipped. Non-finite
//! coordinates are kept as they are.

use posecrate_core::{ColoredPoint3f, Error, Point3f, PointCloud, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Records reserved up front; larger bodies grow as they are read
const PREALLOCATED_RECORDS: usize = 1 << 16;

/// Largest accepted point record, in bytes
const MAX_RECORD_SIZE: usize = 1 << 16;

/// PCD data format variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdDataFormat {
    Ascii,
    Binary,
    BinaryCompressed,
}

/// PCD field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcdFieldType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PcdFieldType {
    fn from_type_and_size(type_char: &str, size: usize) -> Result<Self> {
        match (type_char, size) {
            ("I", 1) => Ok(PcdFieldType::I8),
            ("I", 2) => Ok(PcdFieldType::I16),
            ("I", 4) => Ok(PcdFieldType::I32),
            ("U", 1) => Ok(PcdFieldType::U8),
            ("U", 2) => Ok(PcdFieldType::U16),
            ("U", 4) => Ok(PcdFieldType::U32),
            ("F", 4) => Ok(PcdFieldType::F32),
            ("F", 8) => Ok(PcdFieldType::F64),
            _ => Err(Error::InvalidData(format!(
                "Unknown field type/size combination: {}/{}",
                type_char, size
            ))),
        }
    }

    /// Size of one value in bytes
    pub fn size(&self) -> usize {
        match self {
            PcdFieldType::I8 | PcdFieldType::U8 => 1,
            PcdFieldType::I16 | PcdFieldType::U16 => 2,
            PcdFieldType::I32 | PcdFieldType::U32 | PcdFieldType::F32 => 4,
            PcdFieldType::F64 => 8,
        }
    }

    fn type_char(&self) -> &'static str {
        match self {
            PcdFieldType::I8 | PcdFieldType::I16 | PcdFieldType::I32 => "I",
            PcdFieldType::U8 | PcdFieldType::U16 | PcdFieldType::U32 => "U",
            PcdFieldType::F32 | PcdFieldType::F64 => "F",
        }
    }
}

/// PCD field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcdField {
    pub name: String,
    pub field_type: PcdFieldType,
    pub count: usize,
}

/// PCD header information
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<PcdField>,
    pub width: usize,
    pub height: usize,
    pub viewpoint: [f64; 7], // tx, ty, tz, qw, qx, qy, qz
    pub data_format: PcdDataFormat,
}

impl PcdHeader {
    /// WIDTH * HEIGHT, or an error when the product does not fit
    pub fn point_count(&self) -> Result<usize> {
        self.width.checked_mul(self.height).ok_or_else(|| {
            Error::InvalidData(format!(
                "WIDTH ({}) * HEIGHT ({}) overflows",
                self.width, self.height
            ))
        })
    }

    /// Position of a field's first value within a point record
    pub fn value_offset(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for field in &self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.count;
        }
        None
    }

    /// Type of the named field
    pub fn field_type(&self, name: &str) -> Option<PcdFieldType> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.field_type)
    }

    /// Bytes per point in the binary layout
    pub fn record_size(&self) -> Result<usize> {
        let size = self.fields.iter().try_fold(0usize, |total, field| {
            field
                .count
                .checked_mul(field.field_type.size())
                .and_then(|bytes| total.checked_add(bytes))
        });
        match size {
            Some(size) if size <= MAX_RECORD_SIZE => Ok(size),
            _ => Err(Error::InvalidData(format!(
                "PCD point record exceeds {} bytes",
                MAX_RECORD_SIZE
            ))),
        }
    }
}

/// PCD field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PcdValue {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl PcdValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            PcdValue::I8(v) => v as f64,
            PcdValue::U8(v) => v as f64,
            PcdValue::I16(v) => v as f64,
            PcdValue::U16(v) => v as f64,
            PcdValue::I32(v) => v as f64,
            PcdValue::U32(v) => v as f64,
            PcdValue::F32(v) => v as f64,
            PcdValue::F64(v) => v,
        }
    }

    /// Packed color word; float fields are reinterpreted bit for bit
    fn as_packed_color(&self) -> u32 {
        match *self {
            PcdValue::F32(v) => v.to_bits(),
            PcdValue::U32(v) => v,
            PcdValue::I32(v) => v as u32,
            other => other.as_f64() as u32,
        }
    }
}

/// PCD write options
#[derive(Debug, Clone)]
pub struct PcdWriteOptions {
    pub data_format: PcdDataFormat,
    pub version: String,
    pub viewpoint: Option<[f64; 7]>,
}

impl Default for PcdWriteOptions {
    fn default() -> Self {
        Self {
            data_format: PcdDataFormat::Binary,
            version: "0.7".to_string(),
            viewpoint: None,
        }
    }
}

impl PcdWriteOptions {
    pub fn ascii() -> Self {
        Self {
            data_format: PcdDataFormat::Ascii,
            ..Self::default()
        }
    }
}

/// PCD reader
pub struct PcdReader;

impl PcdReader {
    /// Read a PCD file into a colored point cloud
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Read PCD data from any buffered reader
    pub fn read_from<R: BufRead>(reader: &mut R) -> Result<PointCloud<ColoredPoint3f>> {
        let header = Self::read_header(reader)?;
        let records = Self::read_records(reader, &header)?;
        Self::records_to_cloud(&header, &records)
    }

    /// Parse the header, leaving the reader at the start of the body
    pub fn read_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
        let mut version = None;
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut types: Vec<String> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut width = None;
        let mut height = None;
        let mut viewpoint = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let mut points = None;
        let data_format;

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(Error::InvalidData("Unexpected end of file in PCD header".to_string()));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = trimmed.split_whitespace().collect();
            let values = &parts[1..];
            match parts[0].to_ascii_uppercase().as_str() {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" => names = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = parse_list(values, "SIZE")?,
                "TYPE" => types = values.iter().map(|v| v.to_ascii_uppercase()).collect(),
                "COUNT" => counts = parse_list(values, "COUNT")?,
                "WIDTH" => width = Some(parse_single(values, "WIDTH")?),
                "HEIGHT" => height = Some(parse_single(values, "HEIGHT")?),
                "POINTS" => points = Some(parse_single(values, "POINTS")?),
                "VIEWPOINT" => {
                    if values.len() != 7 {
                        return Err(Error::InvalidData("VIEWPOINT needs 7 values".to_string()));
                    }
                    for (slot, value) in viewpoint.iter_mut().zip(values) {
                        *slot = value
                            .parse::<f64>()
                            .map_err(|_| Error::InvalidData(format!("Invalid VIEWPOINT value: {}", value)))?;
                    }
                }
                "DATA" => {
                    data_format = match values.first().map(|v| v.to_ascii_lowercase()).as_deref() {
                        Some("ascii") => PcdDataFormat::Ascii,
                        Some("binary") => PcdDataFormat::Binary,
                        Some("binary_compressed") => PcdDataFormat::BinaryCompressed,
                        other => {
                            return Err(Error::InvalidData(format!("Unknown DATA format: {:?}", other)))
                        }
                    };
                    break;
                }
                _ => {
                    // Ignore unknown header fields
                }
            }
        }

        if names.is_empty() {
            return Err(Error::InvalidData("Missing FIELDS in PCD header".to_string()));
        }
        if counts.is_empty() {
            counts = vec![1; names.len()];
        }
        if counts.contains(&0) {
            return Err(Error::InvalidData("COUNT values must be at least 1".to_string()));
        }
        if sizes.len() != names.len() || types.len() != names.len() || counts.len() != names.len() {
            return Err(Error::InvalidData(
                "Mismatch between FIELDS, SIZE, TYPE, and COUNT declarations".to_string(),
            ));
        }

        let fields = names
            .into_iter()
            .zip(types.iter().zip(sizes.iter()).zip(counts.iter()))
            .map(|(name, ((type_char, &size), &count))| {
                Ok(PcdField {
                    name,
                    field_type: PcdFieldType::from_type_and_size(type_char, size)?,
                    count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let width = match (width, points) {
            (Some(width), _) => width,
            (None, Some(points)) => points,
            (None, None) => return Err(Error::InvalidData("Missing WIDTH in PCD header".to_string())),
        };
        let height = height.unwrap_or(1);

        let header = PcdHeader {
            version: version.unwrap_or_else(|| "0.7".to_string()),
            fields,
            width,
            height,
            viewpoint,
            data_format,
        };

        let point_count = header.point_count()?;
        if let Some(points) = points {
            if points != point_count {
                return Err(Error::InvalidData(format!(
                    "POINTS ({}) doesn't match WIDTH * HEIGHT ({})",
                    points, point_count
                )));
            }
        }
        header.record_size()?;

        Ok(header)
    }

    /// Read the body into one flat value record per point
    fn read_records<R: BufRead>(reader: &mut R, header: &PcdHeader) -> Result<Vec<Vec<PcdValue>>> {
        match header.data_format {
            PcdDataFormat::Ascii => Self::read_ascii_records(reader, header),
            PcdDataFormat::Binary => Self::read_binary_records(reader, header),
            PcdDataFormat::BinaryCompressed => Err(Error::Unsupported(
                "Binary compressed PCD format not yet supported".to_string(),
            )),
        }
    }

    fn read_ascii_records<R: BufRead>(reader: &mut R, header: &PcdHeader) -> Result<Vec<Vec<PcdValue>>> {
        let expected = header.point_count()?;
        let mut records = Vec::with_capacity(expected.min(PREALLOCATED_RECORDS));
        let mut line = String::new();

        while records.len() < expected {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(Error::InvalidData(format!(
                    "PCD body ended after {} of {} points",
                    records.len(),
                    expected
                )));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut tokens = trimmed.split_whitespace();
            let mut record = Vec::new();
            for field in &header.fields {
                for _ in 0..field.count {
                    let token = tokens
                        .next()
                        .ok_or_else(|| Error::InvalidData("Not enough values in ASCII PCD line".to_string()))?;
                    record.push(parse_ascii_value(token, field.field_type)?);
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    fn read_binary_records<R: Read>(reader: &mut R, header: &PcdHeader) -> Result<Vec<Vec<PcdValue>>> {
        let expected = header.point_count()?;
        let mut buffer = vec![0u8; header.record_size()?];
        let mut records = Vec::with_capacity(expected.min(PREALLOCATED_RECORDS));

        for _ in 0..expected {
            reader.read_exact(&mut buffer)?;
            let mut offset = 0;
            let mut record = Vec::new();
            for field in &header.fields {
                let size = field.field_type.size();
                for _ in 0..field.count {
                    record.push(decode_binary_value(&buffer[offset..offset + size], field.field_type));
                    offset += size;
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    fn records_to_cloud(header: &PcdHeader, records: &[Vec<PcdValue>]) -> Result<PointCloud<ColoredPoint3f>> {
        let coordinate = |name: &str| {
            header
                .value_offset(name)
                .ok_or_else(|| Error::InvalidData(format!("Missing {} coordinate in PCD header", name)))
        };
        let (x, y, z) = (coordinate("x")?, coordinate("y")?, coordinate("z")?);
        let color = header.value_offset("rgb").or_else(|| header.value_offset("rgba"));

        let points = records
            .iter()
            .map(|record| {
                let position = Point3f::new(
                    record[x].as_f64() as f32,
                    record[y].as_f64() as f32,
                    record[z].as_f64() as f32,
                );
                match color {
                    Some(offset) => ColoredPoint3f::new(position, unpack_rgb(record[offset].as_packed_color())),
                    None => ColoredPoint3f::from(position),
                }
            })
            .collect();

        Ok(points)
    }
}

fn parse_list(values: &[&str], keyword: &str) -> Result<Vec<usize>> {
    values
        .iter()
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| Error::InvalidData(format!("Invalid {} value: {}", keyword, v)))
        })
        .collect()
}

fn parse_single(values: &[&str], keyword: &str) -> Result<usize> {
    let value = values
        .first()
        .ok_or_else(|| Error::InvalidData(format!("Missing {} value", keyword)))?;
    value
        .parse::<usize>()
        .map_err(|_| Error::InvalidData(format!("Invalid {} value: {}", keyword, value)))
}

fn parse_ascii_value(token: &str, field_type: PcdFieldType) -> Result<PcdValue> {
    let invalid = || Error::InvalidData(format!("Invalid {:?} value: {}", field_type, token));
    Ok(match field_type {
        PcdFieldType::I8 => PcdValue::I8(token.parse().map_err(|_| invalid())?),
        PcdFieldType::U8 => PcdValue::U8(token.parse().map_err(|_| invalid())?),
        PcdFieldType::I16 => PcdValue::I16(token.parse().map_err(|_| invalid())?),
        PcdFieldType::U16 => PcdValue::U16(token.parse().map_err(|_| invalid())?),
        PcdFieldType::I32 => PcdValue::I32(token.parse().map_err(|_| invalid())?),
        PcdFieldType::U32 => PcdValue::U32(token.parse().map_err(|_| invalid())?),
        PcdFieldType::F32 => PcdValue::F32(token.parse().map_err(|_| invalid())?),
        PcdFieldType::F64 => PcdValue::F64(token.parse().map_err(|_| invalid())?),
    })
}

/// Decode one little-endian value; `bytes` holds exactly `field_type.size()` bytes
fn decode_binary_value(bytes: &[u8], field_type: PcdFieldType) -> PcdValue {
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    match field_type {
        PcdFieldType::I8 => PcdValue::I8(word[0] as i8),
        PcdFieldType::U8 => PcdValue::U8(word[0]),
        PcdFieldType::I16 => PcdValue::I16(i16::from_le_bytes([word[0], word[1]])),
        PcdFieldType::U16 => PcdValue::U16(u16::from_le_bytes([word[0], word[1]])),
        PcdFieldType::I32 => PcdValue::I32(i32::from_le_bytes([word[0], word[1], word[2], word[3]])),
        PcdFieldType::U32 => PcdValue::U32(u32::from_le_bytes([word[0], word[1], word[2], word[3]])),
        PcdFieldType::F32 => PcdValue::F32(f32::from_le_bytes([word[0], word[1], word[2], word[3]])),
        PcdFieldType::F64 => PcdValue::F64(f64::from_le_bytes(word)),
    }
}

fn unpack_rgb(packed: u32) -> [u8; 3] {
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

fn pack_rgb(color: [u8; 3]) -> u32 {
    ((color[0] as u32) << 16) | ((color[1] as u32) << 8) | color[2] as u32
}

/// PCD writer
pub struct PcdWriter;

impl PcdWriter {
    /// Write a colored cloud to a PCD file
    pub fn write_file<P: AsRef<Path>>(
        cloud: &PointCloud<ColoredPoint3f>,
        path: P,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(cloud, &mut writer, options)?;
        writer.flush()?;
        Ok(())
    }

    /// Write a colored cloud as `x y z rgb` records
    pub fn write_to<W: Write>(
        cloud: &PointCloud<ColoredPoint3f>,
        writer: &mut W,
        options: &PcdWriteOptions,
    ) -> Result<()> {
        let field = |name: &str, field_type| PcdField {
            name: name.to_string(),
            field_type,
            count: 1,
        };
        let header = PcdHeader {
            version: options.version.clone(),
            fields: vec![
                field("x", PcdFieldType::F32),
                field("y", PcdFieldType::F32),
                field("z", PcdFieldType::F32),
                field("rgb", PcdFieldType::U32),
            ],
            width: cloud.len(),
            height: 1,
            viewpoint: options.viewpoint.unwrap_or([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]),
            data_format: options.data_format,
        };

        Self::write_header(writer, &header)?;

        match options.data_format {
            PcdDataFormat::Ascii => {
                for point in cloud.iter() {
                    let p = &point.position;
                    writeln!(writer, "{} {} {} {}", p.x, p.y, p.z, pack_rgb(point.color))?;
                }
            }
            PcdDataFormat::Binary => {
                for point in cloud.iter() {
                    let p = &point.position;
                    writer.write_all(&p.x.to_le_bytes())?;
                    writer.write_all(&p.y.to_le_bytes())?;
                    writer.write_all(&p.z.to_le_bytes())?;
                    writer.write_all(&pack_rgb(point.color).to_le_bytes())?;
                }
            }
            PcdDataFormat::BinaryCompressed => {
                return Err(Error::Unsupported(
                    "Binary compressed PCD format not yet supported".to_string(),
                ))
            }
        }

        Ok(())
    }

    fn write_header<W: Write>(writer: &mut W, header: &PcdHeader) -> Result<()> {
        let join = |f: &dyn Fn(&PcdField) -> String| {
            header.fields.iter().map(f).collect::<Vec<_>>().join(" ")
        };

        writeln!(writer, "# .PCD v{} - Point Cloud Data file format", header.version)?;
        writeln!(writer, "VERSION {}", header.version)?;
        writeln!(writer, "FIELDS {}", join(&|f| f.name.clone()))?;
        writeln!(writer, "SIZE {}", join(&|f| f.field_type.size().to_string()))?;
        writeln!(writer, "TYPE {}", join(&|f| f.field_type.type_char().to_string()))?;
        writeln!(writer, "COUNT {}", join(&|f| f.count.to_string()))?;
        writeln!(writer, "WIDTH {}", header.width)?;
        writeln!(writer, "HEIGHT {}", header.height)?;
        let v = &header.viewpoint;
        writeln!(writer, "VIEWPOINT {} {} {} {} {} {} {}", v[0], v[1], v[2], v[3], v[4], v[5], v[6])?;
        writeln!(writer, "POINTS {}", header.point_count()?)?;

        let data = match header.data_format {
            PcdDataFormat::Ascii => "ascii",
            PcdDataFormat::Binary => "binary",
            PcdDataFormat::BinaryCompressed => "binary_compressed",
        };
        writeln!(writer, "DATA {}", data)?;
        Ok(())
    }
}

/// Read a PCD file into a colored point cloud
pub fn read_pcd<P: AsRef<Path>>(path: P) -> Result<PointCloud<ColoredPoint3f>> {
    PcdReader::read_file(path)
}

/// Read PCD data from an in-memory or streaming source
pub fn read_pcd_data<R: BufRead>(reader: &mut R) -> Result<PointCloud<ColoredPoint3f>> {
    PcdReader::read_from(reader)
}

/// Write a colored cloud to a PCD file
pub fn write_pcd<P: AsRef<Path>>(
    cloud: &PointCloud<ColoredPoint3f>,
    path: P,
    options: &PcdWriteOptions,
) -> Result<()> {
    PcdWriter::write_file(cloud, path, options)
}
