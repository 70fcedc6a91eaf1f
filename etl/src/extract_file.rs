//! Delimited extract files: the hand-off between extraction and the bronze load.
//!
//! Files are UTF-8 CSV with a header row. They are written under a
//! `.partial` name and renamed once complete, so a concurrent directory scan
//! only ever sees finished files.

use crate::models::{GeoPoint, ObservationRow};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use common::{Error, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub const FILE_PREFIX: &str = "weather_data_";
pub const FILE_EXTENSION: &str = "csv";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";
pub const LOAD_DTS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A finished extract on disk. Never modified after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractFile {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub target_date: NaiveDate,
    pub row_count: usize,
    /// Points skipped in partial mode, with the reason.
    pub failed_points: Vec<(GeoPoint, String)>,
}

impl ExtractFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn extract_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("temperature_c", DataType::Float64, true),
        Field::new("humidity_pct", DataType::Float64, true),
        Field::new("precip_mm", DataType::Float64, true),
        Field::new("city", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, false),
        Field::new("longitude", DataType::Float64, false),
        Field::new("load_dts_utc", DataType::Utf8, false),
    ]))
}

pub fn rows_to_batch(rows: &[ObservationRow]) -> Result<RecordBatch> {
    let timestamps: Vec<String> = rows
        .iter()
        .map(|r| r.timestamp.format(TIMESTAMP_FORMAT).to_string())
        .collect();
    let load_dts: Vec<String> = rows
        .iter()
        .map(|r| r.load_dts_utc.format(LOAD_DTS_FORMAT).to_string())
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(timestamps)),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.temperature_c).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.humidity_pct).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.precip_mm).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.city.clone()).collect::<Vec<_>>())),
        Arc::new(StringArray::from(rows.iter().map(|r| r.state.clone()).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.latitude).collect::<Vec<_>>())),
        Arc::new(Float64Array::from(rows.iter().map(|r| r.longitude).collect::<Vec<_>>())),
        Arc::new(StringArray::from(load_dts)),
    ];

    Ok(RecordBatch::try_new(extract_schema(), columns)?)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::InvalidInput(format!("column '{}' missing or not text", name)))
}

fn float_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| Error::InvalidInput(format!("column '{}' missing or not numeric", name)))
}

fn optional_float(array: &Float64Array, i: usize) -> Option<f64> {
    (!array.is_null(i)).then(|| array.value(i))
}

pub fn batch_to_rows(batch: &RecordBatch) -> Result<Vec<ObservationRow>> {
    let timestamp = string_column(batch, "timestamp")?;
    let temperature = float_column(batch, "temperature_c")?;
    let humidity = float_column(batch, "humidity_pct")?;
    let precipitation = float_column(batch, "precip_mm")?;
    let city = string_column(batch, "city")?;
    let state = string_column(batch, "state")?;
    let latitude = float_column(batch, "latitude")?;
    let longitude = float_column(batch, "longitude")?;
    let load_dts = string_column(batch, "load_dts_utc")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let ts = NaiveDateTime::parse_from_str(timestamp.value(i), TIMESTAMP_FORMAT).map_err(|e| {
            Error::InvalidInput(format!("invalid timestamp '{}': {}", timestamp.value(i), e))
        })?;
        let loaded = NaiveDateTime::parse_from_str(load_dts.value(i), LOAD_DTS_FORMAT)
            .map_err(|e| {
                Error::InvalidInput(format!("invalid load_dts_utc '{}': {}", load_dts.value(i), e))
            })?
            .and_utc();

        rows.push(ObservationRow {
            timestamp: ts,
            temperature_c: optional_float(temperature, i),
            humidity_pct: optional_float(humidity, i),
            precip_mm: optional_float(precipitation, i),
            city: city.value(i).to_string(),
            state: (!state.is_null(i)).then(|| state.value(i).to_string()),
            latitude: latitude.value(i),
            longitude: longitude.value(i),
            load_dts_utc: loaded,
        });
    }

    Ok(rows)
}

/// Serializes `rows` as CSV with a header row. An empty slice writes only
/// the header.
pub fn write_rows<W: Write>(writer: W, rows: &[ObservationRow]) -> Result<()> {
    let batch = rows_to_batch(rows)?;
    let mut csv_writer = WriterBuilder::new().with_header(true).build(writer);
    csv_writer.write(&batch)?;
    Ok(())
}

pub fn read_rows(path: &Path) -> Result<Vec<ObservationRow>> {
    let file = File::open(path)?;
    let reader = ReaderBuilder::new(extract_schema())
        .with_header(true)
        .build(file)?;

    let mut rows = Vec::new();
    for batch in reader {
        rows.extend(batch_to_rows(&batch?)?);
    }
    Ok(rows)
}

/// First free `weather_data_<YYYYMMDD_HHMMSS>[_n].csv` path in `dir`.
pub fn unique_file_path(dir: &Path, created_at: DateTime<Utc>) -> PathBuf {
    let stem = format!("{}{}", FILE_PREFIX, created_at.format(NAME_TIMESTAMP_FORMAT));
    let mut candidate = dir.join(format!("{}.{}", stem, FILE_EXTENSION));
    let mut suffix = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", stem, suffix, FILE_EXTENSION));
        suffix += 1;
    }
    candidate
}

/// Writes a complete extract into `dir`, creating the directory if needed.
pub fn write_extract_file(
    dir: &Path,
    created_at: DateTime<Utc>,
    target_date: NaiveDate,
    rows: &[ObservationRow],
    failed_points: Vec<(GeoPoint, String)>,
) -> Result<ExtractFile> {
    fs::create_dir_all(dir)?;

    let path = unique_file_path(dir, created_at);
    let partial = path.with_extension(format!("{}.partial", FILE_EXTENSION));
    debug!(path = %partial.display(), rows = rows.len(), "Writing extract");

    let written = File::create(&partial)
        .map_err(Error::from)
        .and_then(|file| {
            let mut file = std::io::BufWriter::new(file);
            write_rows(&mut file, rows)?;
            file.flush()?;
            Ok(())
        })
        .and_then(|_| fs::rename(&partial, &path).map_err(Error::from));

    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e);
    }

    info!(path = %path.display(), rows = rows.len(), %target_date, "Extract file written");

    Ok(ExtractFile {
        path,
        created_at,
        target_date,
        row_count: rows.len(),
        failed_points,
    })
}
