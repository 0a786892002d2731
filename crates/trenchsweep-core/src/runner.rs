//! Simulator process execution.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SweepError};

/// Interface index of the substrate surface.
pub const BASELINE_INTERFACE: usize = 0;
/// Interface index of the deposited layer surface.
pub const DEPOSITED_INTERFACE: usize = 1;

/// Maximum number of stderr bytes carried in a failure.
const STDERR_TAIL_BYTES: usize = 2048;

/// Where the simulator writes its interface files.
///
/// Layout: `<output_path>_<bits>bit/Interface_<index>_0.vtp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLayout {
    pub output_path: PathBuf,
    pub distance_bits: u32,
}

impl OutputLayout {
    pub fn new(output_path: impl Into<PathBuf>, distance_bits: u32) -> Self {
        Self {
            output_path: output_path.into(),
            distance_bits,
        }
    }

    /// Directory the simulator writes into.
    pub fn directory(&self) -> PathBuf {
        let mut dir = OsString::from(self.output_path.as_os_str());
        dir.push(format!("_{}bit", self.distance_bits));
        PathBuf::from(dir)
    }

    pub fn interface_file(&self, index: usize) -> PathBuf {
        self.directory().join(format!("Interface_{index}_0.vtp"))
    }

    pub fn outputs(&self) -> RunOutputs {
        RunOutputs {
            baseline: self.interface_file(BASELINE_INTERFACE),
            deposited: self.interface_file(DEPOSITED_INTERFACE),
        }
    }
}

/// The two interface files a successful run leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutputs {
    pub baseline: PathBuf,
    pub deposited: PathBuf,
}

/// Result of a successful simulator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code (always 0 for a returned outcome).
    pub exit_code: i32,
    pub duration_ms: u64,
    pub outputs: RunOutputs,
}

/// Runs the simulator on a rendered parameter file.
///
/// Implementations must only return once the output files are complete.
/// A non-zero exit is reported as [`SweepError::SimulationFailure`]; runners
/// never retry.
#[async_trait]
pub trait SimulationRunner: Send + Sync {
    async fn run(&self, parameters: &str) -> Result<RunOutcome>;
}

/// Launches the simulator as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub layout: OutputLayout,
    /// Wall-clock limit in seconds (0 = unlimited).
    pub timeout_secs: u64,
}

impl ProcessRunner {
    pub fn new(executable: PathBuf, working_dir: PathBuf, layout: OutputLayout) -> Self {
        Self {
            executable,
            working_dir,
            layout,
            timeout_secs: 0,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Write the parameter file into the working directory. The file is
    /// removed when the returned handle drops.
    fn write_parameter_file(&self, parameters: &str) -> Result<tempfile::NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(".trenchsweep-")
            .suffix(".txt")
            .tempfile_in(&self.working_dir)?;
        file.write_all(parameters.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl SimulationRunner for ProcessRunner {
    async fn run(&self, parameters: &str) -> Result<RunOutcome> {
        let start = Instant::now();
        let parameter_file = self.write_parameter_file(parameters)?;

        debug!(
            executable = %self.executable.display(),
            parameter_file = %parameter_file.path().display(),
            "launching simulator"
        );

        let child = Command::new(&self.executable)
            .arg(parameter_file.path())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SweepError::Io(std::io::Error::new(
                    e.kind(),
                    format!("failed to launch {}: {e}", self.executable.display()),
                ))
            })?;

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| SweepError::SimulationTimeout {
                timeout_secs: self.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        // The parameter file must outlive the child.
        drop(parameter_file);

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!(target: "trenchsweep::simulator", "{line}");
        }

        if !output.status.success() {
            return Err(SweepError::SimulationFailure {
                exit_code,
                stderr: stderr_tail(&output.stderr),
            });
        }

        Ok(RunOutcome {
            exit_code,
            duration_ms,
            outputs: self.layout.outputs(),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut cut = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(cut) {
        cut += 1;
    }
    format!("...{}", &trimmed[cut..])
}
