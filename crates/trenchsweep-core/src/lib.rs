//! trenchsweep core library
//!
//! Drives an external level-set deposition simulator across a schedule of
//! sticking probabilities and turns each run into a per-point thickness
//! profile of the deposited layer.

pub mod analysis;
pub mod config;
pub mod distance;
pub mod error;
pub mod extract;
pub mod fakes;
pub mod geometry;
pub mod manifest;
pub mod obs;
pub mod results;
pub mod runner;
pub mod sweep;
pub mod telemetry;
pub mod template;

pub use analysis::{summarize, ProfileSummary, ThicknessProfile, DEFAULT_BAND};
pub use config::{
    halving_schedule, FailurePolicy, ProcessConfig, SimulatorConfig, StickingProbability,
    SweepConfig, SweepPlan, DEFAULT_SCHEDULE_STEPS,
};
pub use distance::{nearest_distances, DistanceError};
pub use error::{Result, SweepError, TemplateError};
pub use extract::{ChainSelection, InterfaceExtractor, VtpExtractor};
pub use geometry::{Point, Polyline};
pub use manifest::SweepManifest;
pub use results::{CsvResultSink, GeometryId, GeometryRecord, ResultSink, RunRecord, TablePaths};
pub use runner::{OutputLayout, ProcessRunner, RunOutcome, SimulationRunner};
pub use sweep::{template_values, BaselineCache, SweepOrchestrator, SweepSummary};
pub use telemetry::init_tracing;
pub use template::{ParameterTemplate, Placeholder, TemplateValues};

/// Crate version, reported in logs and `--version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
