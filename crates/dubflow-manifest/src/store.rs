//! Manifest load/save and accessors.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use dubflow_utils::atomic_write::write_text_atomic;
use dubflow_utils::canonical::emit_jcs;

use crate::model::{Artifact, GateState, GateStatus, PhaseRecord};

/// Current on-disk schema version. Any other major is rejected at load.
pub const SCHEMA_VERSION: u32 = 1;

/// Manifest errors. Corruption is fatal at load time; no recovery is
/// attempted.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Manifest is corrupt or has an unsupported schema ({path}): {reason}")]
    Corrupt { path: Utf8PathBuf, reason: String },

    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write manifest {path}: {reason}")]
    Write { path: Utf8PathBuf, reason: String },
}

/// The workspace's persistent journal.
///
/// In-memory mutations take effect on disk only at [`Manifest::save`], which
/// serializes to canonical JSON and writes atomically: after any save the
/// file holds either the prior state or the new one in full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(skip)]
    path: Utf8PathBuf,

    pub schema_version: u32,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub workspace: Utf8PathBuf,
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseRecord>,
    #[serde(default)]
    pub gates: BTreeMap<String, GateState>,
}

impl Manifest {
    /// Empty manifest bound to `path`.
    pub fn empty(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
            schema_version: SCHEMA_VERSION,
            job_id: String::new(),
            workspace: Utf8PathBuf::new(),
            artifacts: BTreeMap::new(),
            phases: BTreeMap::new(),
            gates: BTreeMap::new(),
        }
    }

    /// Load the manifest at `path`, or an empty one bound to `path` when the
    /// file does not exist yet.
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        if !path.as_std_path().exists() {
            return Ok(Self::empty(path));
        }

        let content =
            std::fs::read_to_string(path.as_std_path()).map_err(|source| ManifestError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut manifest: Manifest =
            serde_json::from_str(&content).map_err(|e| ManifestError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if manifest.schema_version != SCHEMA_VERSION {
            return Err(ManifestError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported schema_version {} (expected {})",
                    manifest.schema_version, SCHEMA_VERSION
                ),
            });
        }

        manifest.path = path.to_path_buf();
        Ok(manifest)
    }

    /// Serialize to canonical JSON and atomically write to the bound path.
    pub fn save(&self) -> Result<(), ManifestError> {
        let json = emit_jcs(self).map_err(|e| ManifestError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        write_text_atomic(&self.path, &json).map_err(|e| ManifestError::Write {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    /// Path this manifest is bound to.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Bind job identity and workspace root for this run.
    pub fn set_job(&mut self, job_id: &str, workspace: &Utf8Path) {
        self.job_id = job_id.to_string();
        self.workspace = workspace.to_path_buf();
    }

    pub fn get_artifact(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    /// Register or replace the current record for an artifact key.
    pub fn put_artifact(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.key.clone(), artifact);
    }

    pub fn get_phase(&self, name: &str) -> Option<&PhaseRecord> {
        self.phases.get(name)
    }

    /// Register or replace the current record for a phase.
    pub fn put_phase(&mut self, record: PhaseRecord) {
        self.phases.insert(record.name.clone(), record);
    }

    /// Gate status, `Pending` when the gate has no record yet.
    pub fn gate_status(&self, key: &str) -> GateStatus {
        self.gates
            .get(key)
            .map(|g| g.status)
            .unwrap_or(GateStatus::Pending)
    }

    /// Move a pending gate to `Open`. Open and passed gates are unchanged.
    pub fn open_gate(&mut self, key: &str) {
        let entry = self.gates.entry(key.to_string()).or_insert(GateState {
            status: GateStatus::Pending,
        });
        if entry.status == GateStatus::Pending {
            entry.status = GateStatus::Open;
        }
    }

    /// Move a gate to `Passed`. Idempotent; never causes re-execution.
    pub fn pass_gate(&mut self, key: &str) {
        self.gates
            .insert(key.to_string(), GateState {
                status: GateStatus::Passed,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactKind, PhaseStatus, Producer};
    use tempfile::TempDir;

    fn manifest_in(dir: &TempDir) -> Manifest {
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("manifest.json")).unwrap();
        Manifest::empty(&path)
    }

    fn sample_artifact(key: &str) -> Artifact {
        let mut meta = BTreeMap::new();
        meta.insert("codec".to_string(), serde_json::json!("pcm_s16le"));
        meta.insert("channels".to_string(), serde_json::json!(1));
        Artifact {
            key: key.to_string(),
            relpath: Utf8PathBuf::from("audio/audio_raw.wav"),
            kind: ArtifactKind::Wav,
            fingerprint: "aa".repeat(32),
            producer: Producer {
                name: "extract".to_string(),
                version: "1.0.0".to_string(),
            },
            meta,
        }
    }

    #[test]
    fn load_missing_file_yields_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let m = manifest_in(&dir);
        let loaded = Manifest::load(m.path()).unwrap();
        assert_eq!(loaded.schema_version, SCHEMA_VERSION);
        assert!(loaded.artifacts.is_empty());
        assert!(loaded.phases.is_empty());
    }

    #[test]
    fn save_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest_in(&dir);
        m.set_job("job-1", Utf8Path::new("/tmp/ws"));
        m.put_artifact(sample_artifact("extract.audio"));
        let mut rec = PhaseRecord::running("extract", "1.0.0", "fp");
        rec.status = PhaseStatus::Succeeded;
        rec.output_keys = vec!["extract.audio".to_string()];
        m.put_phase(rec);
        m.open_gate("source_review");
        m.save().unwrap();

        let loaded = Manifest::load(m.path()).unwrap();
        assert_eq!(loaded.job_id, m.job_id);
        assert_eq!(loaded.workspace, m.workspace);
        assert_eq!(loaded.artifacts, m.artifacts);
        assert_eq!(loaded.phases, m.phases);
        assert_eq!(loaded.gates, m.gates);
    }

    #[test]
    fn malformed_json_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("manifest.json")).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Corrupt { .. }));
    }

    #[test]
    fn unknown_schema_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path =
            Utf8PathBuf::from_path_buf(dir.path().join("manifest.json")).unwrap();
        std::fs::write(&path, r#"{"schema_version": 2}"#).unwrap();

        let err = Manifest::load(&path).unwrap_err();
        assert!(matches!(err, ManifestError::Corrupt { .. }));
    }

    #[test]
    fn put_artifact_replaces_prior_entry() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest_in(&dir);
        m.put_artifact(sample_artifact("extract.audio"));
        let mut replacement = sample_artifact("extract.audio");
        replacement.fingerprint = "bb".repeat(32);
        m.put_artifact(replacement.clone());

        assert_eq!(m.artifacts.len(), 1);
        assert_eq!(
            m.get_artifact("extract.audio").unwrap().fingerprint,
            replacement.fingerprint
        );
    }

    #[test]
    fn gate_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut m = manifest_in(&dir);

        assert_eq!(m.gate_status("source_review"), GateStatus::Pending);
        m.open_gate("source_review");
        assert_eq!(m.gate_status("source_review"), GateStatus::Open);
        m.pass_gate("source_review");
        assert_eq!(m.gate_status("source_review"), GateStatus::Passed);
        // Opening a passed gate is a no-op.
        m.open_gate("source_review");
        assert_eq!(m.gate_status("source_review"), GateStatus::Passed);
        // Passing again is idempotent.
        m.pass_gate("source_review");
        assert_eq!(m.gate_status("source_review"), GateStatus::Passed);
    }
}
