//! Structured lifecycle events for sweeps.
//!
//! Every event carries an `event` field (`sweep.started`, `run.completed`,
//! ...) so log pipelines can filter on it. Set `TRENCHSWEEP_LOG` to change
//! verbosity.

use tracing::{info, warn, Span};

/// Span covering one sweep invocation.
///
/// Sweeps await child processes, so spans are attached with
/// [`tracing::Instrument`] rather than entered.
pub fn sweep_span(sweep_id: &str) -> Span {
    tracing::info_span!("trenchsweep.sweep", sweep_id = %sweep_id)
}

/// Span covering one simulation run.
///
/// ```ignore
/// runner.run(&parameters).instrument(run_span(0, 0.5, 2)).await
/// ```
pub fn run_span(geometry_index: usize, sticking_probability: f64, repetition: u32) -> Span {
    tracing::info_span!(
        "trenchsweep.run",
        geometry = geometry_index as u64,
        sticking_probability = sticking_probability,
        repetition = repetition,
    )
}

pub fn emit_sweep_started(sweep_id: &str, geometries: usize, probabilities: usize, repetitions: u32) {
    info!(
        event = "sweep.started",
        sweep_id = %sweep_id,
        geometries = geometries,
        probabilities = probabilities,
        repetitions = repetitions,
        total_runs = geometries * probabilities * repetitions as usize,
    );
}

/// Baseline interface captured for a geometry (once per sweep).
pub fn emit_baseline_captured(geometry_id: u32, points: usize) {
    info!(event = "baseline.captured", geometry_id = geometry_id, points = points);
}

pub fn emit_run_completed(duration_ms: u64, points: usize, mean_thickness: f64) {
    info!(
        event = "run.completed",
        duration_ms = duration_ms,
        points = points,
        mean_thickness = mean_thickness,
    );
}

/// A run failed; `skipped` says whether the sweep continues past it.
pub fn emit_run_failed(error: &dyn std::fmt::Display, skipped: bool) {
    warn!(event = "run.failed", error = %error, skipped = skipped);
}

pub fn emit_sweep_finished(sweep_id: &str, duration_ms: u64, completed: usize, failed: usize, success: bool) {
    info!(
        event = "sweep.finished",
        sweep_id = %sweep_id,
        duration_ms = duration_ms,
        completed = completed,
        failed = failed,
        success = success,
    );
}

/// The manifest could not be written; the result tables are unaffected.
pub fn emit_manifest_error(error: &dyn std::fmt::Display) {
    warn!(event = "manifest.write_error", error = %error);
}
