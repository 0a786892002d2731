//! Sweep configuration.
//!
//! A [`SweepConfig`] is deserialised from TOML (every field optional, with
//! defaults matching the reference deposition setup) and then overridden
//! field-by-field from the command line. [`SweepConfig::validate`] runs before
//! any simulation is launched.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::extract::ChainSelection;

/// Number of halvings in the default probability schedule (`1/2^0 … 1/2^12`).
pub const DEFAULT_SCHEDULE_STEPS: u32 = 12;

/// A sticking probability, guaranteed to lie in `(0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct StickingProbability(f64);

impl StickingProbability {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 && value <= 1.0 {
            Ok(Self(value))
        } else {
            Err(SweepError::Configuration(format!(
                "sticking probability must lie in (0, 1], got {value}"
            )))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for StickingProbability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for StickingProbability {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        StickingProbability::new(value).map_err(serde::de::Error::custom)
    }
}

/// The halving schedule `1, 1/2, 1/4, …, 1/2^steps`.
pub fn halving_schedule(steps: u32) -> Vec<f64> {
    (0..=steps).map(|i| 0.5f64.powi(i as i32)).collect()
}

/// How the sweep reacts to a failed simulation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the sweep at the first failed run. Rows already written stay.
    #[default]
    Abort,
    /// Log the failure, record it in the manifest and continue.
    SkipRun,
}

/// Where and how the simulator is launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Simulator executable. Relative paths with a directory component are
    /// resolved against `project_dir`; bare names are looked up on `PATH`.
    pub executable: PathBuf,
    /// Working directory of every simulator run.
    pub project_dir: PathBuf,
    /// Wall-clock limit per run in seconds (0 = unlimited).
    pub timeout_secs: u64,
    /// Custom parameter template; the built-in one is used when absent.
    pub template: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("../../ViennaTools/ViennaTS/build/viennats-2.3.2"),
            project_dir: PathBuf::from("."),
            timeout_secs: 0,
            template: None,
        }
    }
}

/// Physical process parameters substituted into the parameter template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Input geometries, one baseline per file. Normally a single trench.
    pub geometry_files: Vec<PathBuf>,
    /// Output path prefix handed to the simulator.
    pub output_path: PathBuf,
    /// Level-set distance resolution; also tags the output directory.
    pub distance_bits: u32,
    pub fd_scheme: String,
    pub process_time: f64,
    /// Times at which the simulator writes volume output.
    pub output_volume: Vec<f64>,
    pub deposition_rate: f64,
    pub statistical_accuracy: f64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            geometry_files: vec![PathBuf::from("trench.vtk")],
            output_path: PathBuf::from("output"),
            distance_bits: 8,
            fd_scheme: "LAX_FRIEDRICHS_1ST_ORDER".to_string(),
            process_time: 10.0,
            output_volume: vec![10.0],
            deposition_rate: 1.0,
            statistical_accuracy: 1000.0,
        }
    }
}

/// Which runs the sweep performs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepPlan {
    pub sticking_probabilities: Vec<f64>,
    pub repetitions: u32,
    pub on_failure: FailurePolicy,
    pub chains: ChainSelection,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            sticking_probabilities: halving_schedule(DEFAULT_SCHEDULE_STEPS),
            repetitions: 1,
            on_failure: FailurePolicy::Abort,
            chains: ChainSelection::Single,
        }
    }
}

/// Complete configuration of one sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub simulator: SimulatorConfig,
    pub process: ProcessConfig,
    pub sweep: SweepPlan,
}

impl SweepConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SweepError::Configuration(format!("invalid config file: {e}")))
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SweepError::Configuration(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check every value that would otherwise only fail mid-sweep and return
    /// the validated probability schedule.
    pub fn validate(&self) -> Result<Vec<StickingProbability>> {
        if self.sweep.sticking_probabilities.is_empty() {
            return Err(SweepError::Configuration(
                "at least one sticking probability is required".to_string(),
            ));
        }
        let probabilities = self
            .sweep
            .sticking_probabilities
            .iter()
            .map(|&p| StickingProbability::new(p))
            .collect::<Result<Vec<_>>>()?;

        if self.sweep.repetitions == 0 {
            return Err(SweepError::Configuration(
                "repetitions must be a positive integer".to_string(),
            ));
        }
        if self.process.geometry_files.is_empty() {
            return Err(SweepError::Configuration(
                "at least one geometry file is required".to_string(),
            ));
        }
        if self.process.distance_bits == 0 {
            return Err(SweepError::Configuration(
                "distance_bits must be positive".to_string(),
            ));
        }
        if self.process.fd_scheme.trim().is_empty() {
            return Err(SweepError::Configuration(
                "fd_scheme must not be empty".to_string(),
            ));
        }
        for (name, value) in [
            ("process_time", self.process.process_time),
            ("deposition_rate", self.process.deposition_rate),
            ("statistical_accuracy", self.process.statistical_accuracy),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SweepError::Configuration(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if let Some(bad) = self
            .process
            .output_volume
            .iter()
            .find(|t| !(t.is_finite() && **t >= 0.0))
        {
            return Err(SweepError::Configuration(format!(
                "output_volume times must be non-negative, got {bad}"
            )));
        }

        Ok(probabilities)
    }

    /// The project directory as an absolute path.
    ///
    /// The simulator runs inside this directory, so every path handed to it
    /// must be absolute or it would be resolved a second time from there.
    pub fn project_root(&self) -> PathBuf {
        let dir = &self.simulator.project_dir;
        if dir.is_absolute() {
            return dir.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(dir),
            Err(_) => dir.clone(),
        }
    }

    /// Resolve a configured path against the project directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root().join(path)
        }
    }

    /// Simulator program as it should be passed to the process launcher.
    pub fn executable(&self) -> PathBuf {
        let exe = &self.simulator.executable;
        if exe.components().count() > 1 {
            self.resolve(exe)
        } else {
            exe.clone()
        }
    }
}
