//! Sweep orchestration.
//!
//! A sweep walks geometries → sticking probabilities → repetitions. Each
//! step renders a parameter file, runs the simulator, extracts the
//! deposited interface, measures its distance to the baseline and writes one
//! data row before the next run starts.

use std::cell::{Cell, OnceCell};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, Instrument};
use uuid::Uuid;

use crate::config::{FailurePolicy, StickingProbability, SweepConfig};
use crate::distance::nearest_distances;
use crate::error::{Result, SweepError};
use crate::extract::InterfaceExtractor;
use crate::geometry::Polyline;
use crate::manifest::{GeometryEntry, RunEntry, RunStatus, SweepManifest, SweepStatus};
use crate::obs;
use crate::results::{GeometryId, GeometryRecord, ResultSink, RunRecord};
use crate::runner::SimulationRunner;
use crate::template::{ParameterTemplate, TemplateValues};

/// Outcome of a sweep that ran to the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub sweep_id: Uuid,
    /// Runs whose data row was written.
    pub completed: usize,
    /// Runs skipped under [`FailurePolicy::SkipRun`].
    pub failed: usize,
    /// Geometries whose baseline was captured.
    pub geometries: usize,
    pub duration_ms: u64,
    /// False when a manifest is configured and its final write failed, so
    /// the file on disk no longer matches this summary.
    pub manifest_current: bool,
}

impl SweepSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Baseline polyline of one geometry together with its table id.
#[derive(Debug, Clone, PartialEq)]
pub struct Baseline {
    pub geometry_id: GeometryId,
    pub polyline: Polyline,
}

/// One write-once baseline slot per input geometry.
///
/// The substrate does not change between runs on the same geometry, so its
/// interface is extracted from the first successful run only. Ids are
/// assigned in capture order and never re-derived.
#[derive(Debug)]
pub struct BaselineCache {
    slots: Vec<OnceCell<Baseline>>,
    next_id: Cell<GeometryId>,
}

impl BaselineCache {
    pub fn new(geometries: usize) -> Self {
        Self {
            slots: (0..geometries).map(|_| OnceCell::new()).collect(),
            next_id: Cell::new(0),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Baseline> {
        self.slots.get(index).and_then(OnceCell::get)
    }

    /// Number of captured baselines.
    pub fn captured(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Return the cached baseline for `index`, or run `extract` to capture
    /// it. The flag is `true` when this call performed the capture. A failed
    /// extraction leaves the slot empty.
    pub fn get_or_capture<F>(&self, index: usize, extract: F) -> Result<(&Baseline, bool)>
    where
        F: FnOnce() -> Result<Polyline>,
    {
        let slot = self.slots.get(index).ok_or_else(|| {
            SweepError::Configuration(format!("no geometry with index {index}"))
        })?;
        if let Some(baseline) = slot.get() {
            return Ok((baseline, false));
        }

        let polyline = extract()?;
        let geometry_id = self.next_id.get();
        self.next_id.set(geometry_id + 1);
        Ok((slot.get_or_init(|| Baseline { geometry_id, polyline }), true))
    }
}

/// Placeholder values for one run, with paths resolved against the project
/// directory.
pub fn template_values(
    config: &SweepConfig,
    geometry_file: &Path,
    sticking_probability: StickingProbability,
) -> TemplateValues {
    let process = &config.process;
    TemplateValues {
        geometry_file: config.resolve(geometry_file),
        distance_bits: process.distance_bits,
        output_path: config.resolve(&process.output_path),
        fd_scheme: process.fd_scheme.clone(),
        process_time: process.process_time,
        output_volume: process.output_volume.clone(),
        deposition_rate: process.deposition_rate,
        sticking_probability,
        statistical_accuracy: process.statistical_accuracy,
    }
}

/// Drives a complete sweep.
pub struct SweepOrchestrator {
    config: SweepConfig,
    template: ParameterTemplate,
    runner: Arc<dyn SimulationRunner>,
    extractor: Arc<dyn InterfaceExtractor>,
    manifest_path: Option<PathBuf>,
}

impl SweepOrchestrator {
    pub fn new(
        config: SweepConfig,
        template: ParameterTemplate,
        runner: Arc<dyn SimulationRunner>,
        extractor: Arc<dyn InterfaceExtractor>,
    ) -> Self {
        Self {
            config,
            template,
            runner,
            extractor,
            manifest_path: None,
        }
    }

    /// Rewrite a manifest at `path` after every run.
    ///
    /// Write failures are logged and never stop the sweep. The summary's
    /// `manifest_current` reports whether the last write landed.
    pub fn with_manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run every (geometry, probability, repetition) combination in order.
    ///
    /// Configuration problems are reported before the first simulation.
    /// Under [`FailurePolicy::Abort`] the first failed run ends the sweep
    /// with its error; rows written up to that point stay on disk.
    pub async fn run(&self, sink: &mut dyn ResultSink) -> Result<SweepSummary> {
        let probabilities = self.config.validate()?;
        let sweep_id = Uuid::new_v4();
        let id = sweep_id.to_string();
        self.run_validated(sweep_id, &probabilities, sink)
            .instrument(obs::sweep_span(&id))
            .await
    }

    async fn run_validated(
        &self,
        sweep_id: Uuid,
        probabilities: &[StickingProbability],
        sink: &mut dyn ResultSink,
    ) -> Result<SweepSummary> {
        let start = Instant::now();
        let plan = &self.config.sweep;
        let geometries = &self.config.process.geometry_files;
        let id = sweep_id.to_string();

        let mut manifest =
            SweepManifest::new(sweep_id, self.config.clone(), self.template.source());
        self.save_manifest(&manifest);
        obs::emit_sweep_started(&id, geometries.len(), probabilities.len(), plan.repetitions);

        let cache = BaselineCache::new(geometries.len());
        let mut completed = 0usize;
        let mut failed = 0usize;

        for (index, geometry) in geometries.iter().enumerate() {
            for &p in probabilities {
                for repetition in 0..plan.repetitions {
                    let run_start = Instant::now();
                    let outcome = self
                        .run_once(&cache, index, geometry, p, repetition, sink, &mut manifest)
                        .instrument(obs::run_span(index, p.value(), repetition))
                        .await;
                    let duration_ms = run_start.elapsed().as_millis() as u64;

                    match outcome {
                        Ok(geometry_id) => {
                            completed += 1;
                            manifest.record_run(RunEntry {
                                geometry_index: index,
                                geometry_id: Some(geometry_id),
                                sticking_probability: p.value(),
                                repetition,
                                status: RunStatus::Completed,
                                error: None,
                                duration_ms,
                            });
                        }
                        Err(err) => {
                            let skip =
                                plan.on_failure == FailurePolicy::SkipRun && err.is_run_scoped();
                            obs::emit_run_failed(&err, skip);
                            manifest.record_run(RunEntry {
                                geometry_index: index,
                                geometry_id: cache.get(index).map(|b| b.geometry_id),
                                sticking_probability: p.value(),
                                repetition,
                                status: RunStatus::Failed,
                                error: Some(err.to_string()),
                                duration_ms,
                            });
                            if !skip {
                                manifest.finish(SweepStatus::Aborted);
                                self.save_manifest(&manifest);
                                obs::emit_sweep_finished(
                                    &id,
                                    start.elapsed().as_millis() as u64,
                                    completed,
                                    failed + 1,
                                    false,
                                );
                                return Err(err);
                            }
                            failed += 1;
                        }
                    }
                    self.save_manifest(&manifest);
                }
            }
        }

        let summary = SweepSummary {
            sweep_id,
            completed,
            failed,
            geometries: cache.captured(),
            duration_ms: start.elapsed().as_millis() as u64,
            manifest_current: true,
        };
        manifest.finish(if summary.success() {
            SweepStatus::Completed
        } else {
            SweepStatus::CompletedWithFailures
        });
        let summary = SweepSummary {
            manifest_current: self.save_manifest(&manifest),
            ..summary
        };
        obs::emit_sweep_finished(
            &id,
            summary.duration_ms,
            summary.completed,
            summary.failed,
            summary.success(),
        );
        Ok(summary)
    }

    /// One simulation run. Returns the geometry id the data row was written
    /// under.
    #[allow(clippy::too_many_arguments)]
    async fn run_once(
        &self,
        cache: &BaselineCache,
        index: usize,
        geometry: &Path,
        p: StickingProbability,
        repetition: u32,
        sink: &mut dyn ResultSink,
        manifest: &mut SweepManifest,
    ) -> Result<GeometryId> {
        let parameters = self
            .template
            .render(&template_values(&self.config, geometry, p));
        let outcome = self.runner.run(&parameters).await?;

        let (baseline, captured) =
            cache.get_or_capture(index, || self.extractor.extract(&outcome.outputs.baseline))?;
        if captured {
            sink.write_geometry(&GeometryRecord::from_polyline(
                baseline.geometry_id,
                &baseline.polyline,
            ))?;
            manifest.record_geometry(GeometryEntry {
                geometry_id: baseline.geometry_id,
                path: self.config.resolve(geometry),
                points: baseline.polyline.len(),
            });
            obs::emit_baseline_captured(baseline.geometry_id, baseline.polyline.len());
        }

        let deposited = self.extractor.extract(&outcome.outputs.deposited)?;
        let distances = nearest_distances(&baseline.polyline, &deposited).map_err(|e| {
            SweepError::DataFormat {
                path: outcome.outputs.deposited.clone(),
                reason: e.to_string(),
            }
        })?;

        let mean = distances.iter().sum::<f64>() / distances.len() as f64;
        sink.write_run(&RunRecord {
            geometry_id: baseline.geometry_id,
            sticking_probability: p.value(),
            repetition,
            distances,
        })?;
        obs::emit_run_completed(outcome.duration_ms, baseline.polyline.len(), mean);

        Ok(baseline.geometry_id)
    }

    /// Returns false if a configured manifest could not be written.
    fn save_manifest(&self, manifest: &SweepManifest) -> bool {
        let Some(path) = &self.manifest_path else {
            return true;
        };
        match manifest.write(path) {
            Ok(()) => {
                debug!(runs = manifest.runs.len(), "manifest updated");
                true
            }
            Err(err) => {
                obs::emit_manifest_error(&err);
                false
            }
        }
    }
}
