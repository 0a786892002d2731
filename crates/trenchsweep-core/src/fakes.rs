//! In-memory fakes for the sweep traits (testing only)
//!
//! Provides `FakeRunner`, `MemorySink` and `CountingExtractor`, plus helpers
//! that write small `.vtp` interface files. None of them launch a process.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, SweepError};
use crate::extract::{InterfaceExtractor, VtpExtractor};
use crate::geometry::{Point, Polyline};
use crate::results::{GeometryRecord, ResultSink, RunRecord};
use crate::runner::{OutputLayout, RunOutcome, SimulationRunner};

// ---------------------------------------------------------------------------
// Interface files
// ---------------------------------------------------------------------------

/// Nine-point trench cross-section: 2 wide, 2 deep, flat top on both sides.
pub fn trench_baseline() -> Polyline {
    Polyline::from_xy(&[
        (-2.0, 0.0),
        (-1.0, 0.0),
        (-1.0, -1.0),
        (-1.0, -2.0),
        (0.0, -2.0),
        (1.0, -2.0),
        (1.0, -1.0),
        (1.0, 0.0),
        (2.0, 0.0),
    ])
}

/// The same 8-wide, 2-deep trench sampled `steps_per_unit` times per unit
/// length. Walls share one exact x value and flats one exact y value, so at
/// 20 steps per unit every wall and flat holds more than 32 points.
pub fn dense_trench(steps_per_unit: u32) -> Polyline {
    let n = steps_per_unit.max(1) as i32;
    let at = |k: i32| f64::from(k) / f64::from(n);

    let mut coords = Vec::new();
    coords.extend((-4 * n..=-n).map(|k| (at(k), 0.0)));
    coords.extend((1..=2 * n).map(|k| (-1.0, at(-k))));
    coords.extend((-n + 1..=n).map(|k| (at(k), -2.0)));
    coords.extend((0..2 * n).rev().map(|k| (1.0, at(-k))));
    coords.extend((n + 1..=4 * n).map(|k| (at(k), 0.0)));
    Polyline::from_xy(&coords)
}

/// `baseline` moved up by `thickness`.
pub fn raised(baseline: &Polyline, thickness: f64) -> Polyline {
    baseline
        .points()
        .iter()
        .map(|p| Point::new(p.x, p.y + thickness, p.z))
        .collect::<Vec<_>>()
        .into()
}

/// Render `polyline` as an ascii `.vtp` document. Segments are listed
/// last-to-first so readers cannot rely on file order.
pub fn vtp_document(polyline: &Polyline) -> String {
    let points = polyline.points();
    let segments = points.len().saturating_sub(1);

    let mut coords = String::new();
    for p in points {
        let _ = writeln!(coords, "          {} {} {}", p.x, p.y, p.z);
    }
    let mut connectivity = Vec::with_capacity(segments * 2);
    for i in (0..segments).rev() {
        connectivity.push((i + 1).to_string());
        connectivity.push(i.to_string());
    }
    let offsets: Vec<String> = (1..=segments).map(|i| (i * 2).to_string()).collect();

    format!(
        r#"<?xml version="1.0"?>
<VTKFile type="PolyData" version="0.1" byte_order="LittleEndian">
  <PolyData>
    <Piece NumberOfPoints="{n}" NumberOfVerts="0" NumberOfLines="{segments}" NumberOfStrips="0" NumberOfPolys="0">
      <Points>
        <DataArray type="Float64" NumberOfComponents="3" format="ascii">
{coords}        </DataArray>
      </Points>
      <Lines>
        <DataArray type="Int32" Name="connectivity" format="ascii">{connectivity}</DataArray>
        <DataArray type="Int32" Name="offsets" format="ascii">{offsets}</DataArray>
      </Lines>
    </Piece>
  </PolyData>
</VTKFile>
"#,
        n = points.len(),
        connectivity = connectivity.join(" "),
        offsets = offsets.join(" "),
    )
}

/// Write `polyline` to `path` as a `.vtp` file, creating parent directories.
pub fn write_vtp(path: &Path, polyline: &Polyline) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, vtp_document(polyline))
}

// ---------------------------------------------------------------------------
// FakeRunner
// ---------------------------------------------------------------------------

/// Stands in for the simulator: every call writes a baseline and a raised
/// deposited layer into `layout`. Call `n` (1-based) deposits a layer of
/// thickness `0.5 / (n + 1)`.
#[derive(Debug)]
pub struct FakeRunner {
    layout: OutputLayout,
    baseline: Polyline,
    per_geometry: Vec<(String, Polyline)>,
    fail_on: Vec<usize>,
    calls: AtomicUsize,
    parameters: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new(layout: OutputLayout, baseline: Polyline) -> Self {
        Self {
            layout,
            baseline,
            per_geometry: Vec::new(),
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
            parameters: Mutex::new(Vec::new()),
        }
    }

    /// Make the given calls (1-based) exit with code 1.
    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.to_vec();
        self
    }

    /// Use `baseline` for runs whose parameter file mentions `geometry_name`.
    pub fn with_geometry(mut self, geometry_name: &str, baseline: Polyline) -> Self {
        self.per_geometry.push((geometry_name.to_string(), baseline));
        self
    }

    fn baseline_for(&self, parameters: &str) -> &Polyline {
        self.per_geometry
            .iter()
            .find(|(name, _)| parameters.contains(name.as_str()))
            .map_or(&self.baseline, |(_, line)| line)
    }

    pub fn thickness_for_call(n: usize) -> f64 {
        0.5 / (n as f64 + 1.0)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every parameter file received, in call order.
    pub fn parameters(&self) -> Vec<String> {
        self.parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SimulationRunner for FakeRunner {
    async fn run(&self, parameters: &str) -> Result<RunOutcome> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.parameters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(parameters.to_string());

        if self.fail_on.contains(&n) {
            return Err(SweepError::SimulationFailure {
                exit_code: 1,
                stderr: format!("fake failure on call {n}"),
            });
        }

        let outputs = self.layout.outputs();
        let baseline = self.baseline_for(parameters);
        write_vtp(&outputs.baseline, baseline)?;
        write_vtp(
            &outputs.deposited,
            &raised(baseline, Self::thickness_for_call(n)),
        )?;

        Ok(RunOutcome {
            exit_code: 0,
            duration_ms: 1,
            outputs,
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Result sink that keeps rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub geometries: Vec<GeometryRecord>,
    pub runs: Vec<RunRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultSink for MemorySink {
    fn write_geometry(&mut self, record: &GeometryRecord) -> Result<()> {
        self.geometries.push(record.clone());
        Ok(())
    }

    fn write_run(&mut self, record: &RunRecord) -> Result<()> {
        self.runs.push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CountingExtractor
// ---------------------------------------------------------------------------

/// Wraps [`VtpExtractor`] and counts extractions per file.
#[derive(Debug, Default)]
pub struct CountingExtractor {
    inner: VtpExtractor,
    counts: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingExtractor {
    pub fn new(inner: VtpExtractor) -> Self {
        Self {
            inner,
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn count(&self, path: &Path) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
            .unwrap_or(0)
    }
}

impl InterfaceExtractor for CountingExtractor {
    fn extract(&self, path: &Path) -> Result<Polyline> {
        *self
            .counts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(path.to_path_buf())
            .or_insert(0) += 1;
        self.inner.extract(path)
    }
}
