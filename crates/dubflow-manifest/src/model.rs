//! Record types persisted in the manifest.

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What kind of file an artifact is.
///
/// `Dir` artifacts are fingerprinted over a canonical listing of descendant
/// file fingerprints rather than raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Json,
    Srt,
    Wav,
    Mp4,
    Dir,
    Text,
}

/// The phase (name, version) that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
}

/// A produced output registered in the manifest.
///
/// `key` is globally unique within a workspace; re-producing the same key
/// replaces the record. `meta` is free-form phase annotation and never
/// participates in fingerprinting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub key: String,
    pub relpath: Utf8PathBuf,
    pub kind: ArtifactKind,
    pub fingerprint: String,
    pub producer: Producer,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

/// Execution status of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

/// Error detail recorded for a failed phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Per-phase execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub name: String,
    pub status: PhaseStatus,
    /// Phase version at last execution.
    pub version: String,
    /// Combined fingerprint over required inputs, version, and config slice.
    pub input_fingerprint: String,
    /// Provided artifact keys on last success.
    #[serde(default)]
    pub output_keys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Whether the last invocation was skipped on a matching input
    /// fingerprint.
    #[serde(default)]
    pub skipped: bool,
}

impl PhaseRecord {
    /// Fresh record for a phase about to run.
    pub fn running(name: &str, version: &str, input_fingerprint: &str) -> Self {
        Self {
            name: name.to_string(),
            status: PhaseStatus::Running,
            version: version.to_string(),
            input_fingerprint: input_fingerprint.to_string(),
            output_keys: Vec::new(),
            started_at: Some(Utc::now()),
            finished_at: None,
            metrics: BTreeMap::new(),
            error: None,
            skipped: false,
        }
    }
}

/// Lifecycle of a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pending,
    Open,
    Passed,
}

/// Gate state persisted in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateState {
    pub status: GateStatus,
}
