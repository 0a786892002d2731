//! Provenance record of one sweep invocation.
//!
//! The manifest sits next to the result tables and is rewritten after every
//! run, so it always describes what the tables contain. A manifest still in
//! the `running` state belongs to an interrupted sweep.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::SweepConfig;
use crate::error::Result;
use crate::results::GeometryId;

pub const MANIFEST_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    Running,
    Completed,
    /// Ran to the end but skipped at least one failed run.
    CompletedWithFailures,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryEntry {
    pub geometry_id: GeometryId,
    pub path: PathBuf,
    pub points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEntry {
    /// Position of the geometry in the configured list.
    pub geometry_index: usize,
    /// Table id; absent when the run failed before its baseline was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_id: Option<GeometryId>,
    pub sticking_probability: f64,
    pub repetition: u32,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepManifest {
    pub schema_version: String,
    pub sweep_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SweepStatus,
    /// SHA-256 of the parameter template text, hex encoded.
    pub template_digest: String,
    pub config: SweepConfig,
    #[serde(default)]
    pub geometries: Vec<GeometryEntry>,
    #[serde(default)]
    pub runs: Vec<RunEntry>,
}

impl SweepManifest {
    pub fn new(sweep_id: Uuid, config: SweepConfig, template_source: &str) -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION.to_string(),
            sweep_id,
            started_at: Utc::now(),
            finished_at: None,
            status: SweepStatus::Running,
            template_digest: template_digest(template_source),
            config,
            geometries: Vec::new(),
            runs: Vec::new(),
        }
    }

    pub fn record_geometry(&mut self, entry: GeometryEntry) {
        self.geometries.push(entry);
    }

    pub fn record_run(&mut self, entry: RunEntry) {
        self.runs.push(entry);
    }

    pub fn finish(&mut self, status: SweepStatus) {
        self.finished_at = Some(Utc::now());
        self.status = status;
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &RunEntry> {
        self.runs.iter().filter(|r| r.status == RunStatus::Failed)
    }

    /// Replace the file at `path` atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let content = serde_json::to_vec_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }
}

/// Hex SHA-256 digest of template text.
pub fn template_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_digest_is_stable() {
        let a = template_digest("x = ${PROCESS_TIME};");
        assert_eq!(a.len(), 64);
        assert_eq!(a, template_digest("x = ${PROCESS_TIME};"));
        assert_ne!(a, template_digest("x = ${PROCESS_TIME};\n"));
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.manifest.json");

        let mut manifest = SweepManifest::new(Uuid::new_v4(), SweepConfig::default(), "tpl");
        manifest.record_run(RunEntry {
            geometry_index: 0,
            geometry_id: Some(0),
            sticking_probability: 0.5,
            repetition: 0,
            status: RunStatus::Completed,
            error: None,
            duration_ms: 10,
        });
        manifest.write(&path).unwrap();

        manifest.record_run(RunEntry {
            geometry_index: 0,
            geometry_id: Some(0),
            sticking_probability: 0.25,
            repetition: 0,
            status: RunStatus::Failed,
            error: Some("simulation exited with code 3: boom".to_string()),
            duration_ms: 4,
        });
        manifest.finish(SweepStatus::Aborted);
        manifest.write(&path).unwrap();

        let loaded = SweepManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.status, SweepStatus::Aborted);
        assert_eq!(loaded.failed_runs().count(), 1);

        // Only the manifest itself remains; the temp file was persisted over it.
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RunStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
        let json = serde_json::to_string(&SweepStatus::CompletedWithFailures).unwrap();
        assert_eq!(json, "\"completed_with_failures\"");
    }
}
