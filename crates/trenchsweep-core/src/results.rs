//! Persisted result tables.
//!
//! Two headerless CSV tables, joined by `geometry_id`:
//!
//! - data table: `geometry_id, sticking_probability, repetition, d_0, …, d_{m-1}`
//! - geometry table: `geometry_id, axis, c_0, …, c_{m-1}` with axis 0 = x, 1 = y
//!
//! Rows are written one at a time and synced to disk before the next
//! simulation starts, so an interrupted sweep leaves a shorter but
//! well-formed table.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::geometry::Polyline;

/// Identifier of one baseline geometry within a sweep.
pub type GeometryId = u32;

/// Baseline coordinates of one geometry, stored once per sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub geometry_id: GeometryId,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl GeometryRecord {
    pub fn from_polyline(geometry_id: GeometryId, polyline: &Polyline) -> Self {
        Self {
            geometry_id,
            xs: polyline.xs(),
            ys: polyline.ys(),
        }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }
}

/// Thickness profile of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub geometry_id: GeometryId,
    pub sticking_probability: f64,
    pub repetition: u32,
    pub distances: Vec<f64>,
}

/// Destination for sweep results.
pub trait ResultSink {
    fn write_geometry(&mut self, record: &GeometryRecord) -> Result<()>;
    fn write_run(&mut self, record: &RunRecord) -> Result<()>;
}

/// File names derived from one output base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePaths {
    pub data: PathBuf,
    pub geometry: PathBuf,
    pub manifest: PathBuf,
}

impl TablePaths {
    /// `results` (or `results.csv`) → `results.csv`, `results_geometry.csv`,
    /// `results.manifest.json`.
    pub fn from_base(base: &Path) -> Self {
        let stem = if base.extension().is_some_and(|e| e == "csv") {
            base.with_extension("")
        } else {
            base.to_path_buf()
        };
        let with_suffix = |suffix: &str| {
            let mut name = stem.as_os_str().to_owned();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            data: with_suffix(".csv"),
            geometry: with_suffix("_geometry.csv"),
            manifest: with_suffix(".manifest.json"),
        }
    }
}

/// Writes both tables as CSV, syncing after every row.
pub struct CsvResultSink {
    data: csv::Writer<File>,
    geometry: csv::Writer<File>,
}

impl CsvResultSink {
    /// Create (or truncate) both tables.
    pub fn create(paths: &TablePaths) -> Result<Self> {
        Ok(Self {
            data: open_writer(&paths.data)?,
            geometry: open_writer(&paths.geometry)?,
        })
    }
}

fn open_writer(path: &Path) -> Result<csv::Writer<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

fn write_synced(writer: &mut csv::Writer<File>, fields: Vec<String>) -> Result<()> {
    writer.write_record(&fields)?;
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

impl ResultSink for CsvResultSink {
    fn write_geometry(&mut self, record: &GeometryRecord) -> Result<()> {
        for (axis, coords) in [(0u8, &record.xs), (1u8, &record.ys)] {
            let mut fields = vec![record.geometry_id.to_string(), axis.to_string()];
            fields.extend(coords.iter().map(f64::to_string));
            write_synced(&mut self.geometry, fields)?;
        }
        Ok(())
    }

    fn write_run(&mut self, record: &RunRecord) -> Result<()> {
        let mut fields = vec![
            record.geometry_id.to_string(),
            record.sticking_probability.to_string(),
            record.repetition.to_string(),
        ];
        fields.extend(record.distances.iter().map(f64::to_string));
        write_synced(&mut self.data, fields)
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?)
}

fn field<T: std::str::FromStr>(
    path: &Path,
    row: usize,
    record: &csv::StringRecord,
    index: usize,
    what: &str,
) -> Result<T> {
    let raw = record.get(index).ok_or_else(|| {
        SweepError::data_format(path, format!("row {row}: missing {what} column"))
    })?;
    raw.trim()
        .parse()
        .map_err(|_| SweepError::data_format(path, format!("row {row}: invalid {what} {raw:?}")))
}

fn values_from(path: &Path, row: usize, record: &csv::StringRecord, skip: usize) -> Result<Vec<f64>> {
    (skip..record.len())
        .map(|i| field::<f64>(path, row, record, i, "value"))
        .collect()
}

/// Read every row of a data table.
pub fn read_data_table(path: &Path) -> Result<Vec<RunRecord>> {
    let mut reader = open_reader(path)?;
    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        rows.push(RunRecord {
            geometry_id: field(path, row, &record, 0, "geometry_id")?,
            sticking_probability: field(path, row, &record, 1, "sticking_probability")?,
            repetition: field(path, row, &record, 2, "repetition")?,
            distances: values_from(path, row, &record, 3)?,
        });
    }
    Ok(rows)
}

/// Read a geometry table, pairing the x and y rows of each geometry.
pub fn read_geometry_table(path: &Path) -> Result<Vec<GeometryRecord>> {
    let mut reader = open_reader(path)?;
    let mut axes: BTreeMap<GeometryId, (Option<Vec<f64>>, Option<Vec<f64>>)> = BTreeMap::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let id: GeometryId = field(path, row, &record, 0, "geometry_id")?;
        let axis: u8 = field(path, row, &record, 1, "axis")?;
        let coords = values_from(path, row, &record, 2)?;
        let entry = axes.entry(id).or_default();
        let slot = match axis {
            0 => &mut entry.0,
            1 => &mut entry.1,
            other => {
                return Err(SweepError::data_format(
                    path,
                    format!("row {row}: axis must be 0 or 1, got {other}"),
                ))
            }
        };
        if slot.replace(coords).is_some() {
            return Err(SweepError::data_format(
                path,
                format!("row {row}: duplicate axis {axis} for geometry {id}"),
            ));
        }
    }

    axes.into_iter()
        .map(|(geometry_id, pair)| match pair {
            (Some(xs), Some(ys)) if xs.len() == ys.len() => Ok(GeometryRecord {
                geometry_id,
                xs,
                ys,
            }),
            (Some(_), Some(_)) => Err(SweepError::data_format(
                path,
                format!("geometry {geometry_id}: x and y rows differ in length"),
            )),
            _ => Err(SweepError::data_format(
                path,
                format!("geometry {geometry_id}: missing x or y row"),
            )),
        })
        .collect()
}
