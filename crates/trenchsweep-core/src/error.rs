//! Error taxonomy for the sweep pipeline.

use std::path::{Path, PathBuf};

/// Errors produced while parsing or rendering a parameter template.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder ${{{name}}} at byte {offset}")]
    UnknownPlaceholder { name: String, offset: usize },

    #[error("template never references placeholder ${{{name}}}")]
    MissingPlaceholder { name: &'static str },

    #[error("unterminated placeholder starting at byte {offset}")]
    Unterminated { offset: usize },

    #[error("dangling '$' at byte {offset} (use '$$' for a literal dollar sign)")]
    DanglingDollar { offset: usize },
}

/// Errors produced by the sweep pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("template error: {0}")]
    Template(#[from] TemplateError),

    #[error("simulation exited with code {exit_code}: {stderr}")]
    SimulationFailure { exit_code: i32, stderr: String },

    #[error("simulation timed out after {timeout_secs} seconds")]
    SimulationTimeout { timeout_secs: u64 },

    #[error("invalid data in {}: {reason}", path.display())]
    DataFormat { path: PathBuf, reason: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SweepError {
    pub(crate) fn data_format(path: &Path, reason: impl Into<String>) -> Self {
        SweepError::DataFormat {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to a single simulation run rather than to
    /// the sweep as a whole. Only run-scoped errors may be skipped.
    pub fn is_run_scoped(&self) -> bool {
        matches!(
            self,
            SweepError::SimulationFailure { .. }
                | SweepError::SimulationTimeout { .. }
                | SweepError::DataFormat { .. }
        )
    }
}

/// Result type for sweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_error_display() {
        let err = TemplateError::UnknownPlaceholder {
            name: "FOO".to_string(),
            offset: 12,
        };
        assert_eq!(err.to_string(), "unknown placeholder ${FOO} at byte 12");

        let err = TemplateError::MissingPlaceholder {
            name: "STICKING_PROBABILITY",
        };
        assert!(err.to_string().contains("STICKING_PROBABILITY"));
    }

    #[test]
    fn test_data_format_display_includes_path() {
        let err = SweepError::data_format(Path::new("out/Interface_0_0.vtp"), "no points");
        let msg = err.to_string();
        assert!(msg.contains("Interface_0_0.vtp"));
        assert!(msg.contains("no points"));
    }

    #[test]
    fn test_run_scoped_classification() {
        assert!(SweepError::SimulationFailure {
            exit_code: 1,
            stderr: String::new()
        }
        .is_run_scoped());
        assert!(SweepError::SimulationTimeout { timeout_secs: 5 }.is_run_scoped());
        assert!(SweepError::data_format(Path::new("x"), "bad").is_run_scoped());
        assert!(!SweepError::Configuration("bad".to_string()).is_run_scoped());
        assert!(!SweepError::Io(std::io::Error::other("disk full")).is_run_scoped());
    }
}
