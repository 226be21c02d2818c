//! Phase contract for the dubflow pipeline.
//!
//! This crate is the shared surface between the runner and phase
//! implementations: declarative [`PhaseSpec`] metadata (name, version,
//! `requires`/`provides` edges, config keys) that never loads the heavy
//! implementation, a [`Phase`] trait materialized lazily on first actual
//! execution, and the context/result types a phase exchanges with the
//! runner. It exists as its own crate so the registry and the runner share
//! types without a dependency cycle.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;

use dubflow_config::PipelineConfig;
use dubflow_manifest::{Artifact, ArtifactKind, ErrorInfo};

/// Declaration of one artifact a phase provides: its key, kind, and the
/// deterministic workspace-relative path the runner allocates for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactDecl {
    pub key: &'static str,
    pub kind: ArtifactKind,
    pub relpath: &'static str,
}

/// Runtime context handed to every phase.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique identifier of this pipeline invocation.
    pub job_id: String,
    /// Workspace root; all artifact paths live under it.
    pub workspace: Utf8PathBuf,
    /// The source video being dubbed.
    pub video_path: Utf8PathBuf,
    /// The frozen configuration record.
    pub config: PipelineConfig,
}

/// Output paths the runner allocated for a phase, one per provided key.
///
/// Phases must write only under paths they were given.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOutputs {
    paths: BTreeMap<String, Utf8PathBuf>,
}

impl ResolvedOutputs {
    pub fn insert(&mut self, key: &str, path: Utf8PathBuf) {
        self.paths.insert(key.to_string(), path);
    }

    pub fn path(&self, key: &str) -> Option<&Utf8Path> {
        self.paths.get(key).map(Utf8PathBuf::as_path)
    }

    /// Allocated path for `key`, or an error naming the missing key.
    pub fn require(&self, key: &str) -> Result<&Utf8Path> {
        self.path(key)
            .ok_or_else(|| anyhow::anyhow!("No output path allocated for key: {key}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Utf8Path)> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v.as_path()))
    }
}

/// Whether a phase run succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Succeeded,
    Failed,
}

/// What a phase hands back to the runner.
#[derive(Debug, Clone)]
pub struct PhaseResult {
    pub status: PhaseOutcome,
    /// Keys actually produced; must be a subset of the spec's `provides`.
    pub outputs: Vec<String>,
    /// Numeric summary for the phase record.
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub warnings: Vec<String>,
    pub error: Option<ErrorInfo>,
}

impl PhaseResult {
    pub fn succeeded(outputs: Vec<String>) -> Self {
        Self {
            status: PhaseOutcome::Succeeded,
            outputs,
            metrics: BTreeMap::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub fn failed(kind: &str, message: impl Into<String>) -> Self {
        Self {
            status: PhaseOutcome::Failed,
            outputs: Vec::new(),
            metrics: BTreeMap::new(),
            warnings: Vec::new(),
            error: Some(ErrorInfo {
                kind: kind.to_string(),
                message: message.into(),
                traceback: None,
            }),
        }
    }

    pub fn with_metric(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.to_string(), value.into());
        self
    }
}

/// A phase implementation.
///
/// The runner resolves inputs and allocates output paths; the phase reads
/// from `inputs` (keyed artifact records, paths relative to
/// `ctx.workspace`), writes to the allocated paths, and reports what it
/// produced. Internal fan-out is the phase's own business; it must join
/// all workers before returning.
pub trait Phase: Send + Sync {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult>;
}

/// Thunk that materializes a phase implementation.
pub type PhaseLoader = fn() -> Box<dyn Phase>;

/// Immutable declaration of one phase.
///
/// Metadata is static so listing phases or planning never touches the
/// implementation; the loader runs once, on first execution.
pub struct PhaseSpec {
    pub name: &'static str,
    /// Semver; a bump forces re-execution of the phase and everything
    /// downstream of it.
    pub version: String,
    pub label: &'static str,
    /// Artifact keys consumed, in fingerprint order.
    pub requires: Vec<&'static str>,
    /// Artifacts produced, in declaration order.
    pub provides: Vec<ArtifactDecl>,
    /// Configuration keys that enter this phase's input fingerprint.
    pub config_keys: &'static [&'static str],
    loader: PhaseLoader,
    instance: OnceCell<Box<dyn Phase>>,
}

impl PhaseSpec {
    pub fn new(
        name: &'static str,
        version: &str,
        label: &'static str,
        requires: Vec<&'static str>,
        provides: Vec<ArtifactDecl>,
        config_keys: &'static [&'static str],
        loader: PhaseLoader,
    ) -> Self {
        Self {
            name,
            version: version.to_string(),
            label,
            requires,
            provides,
            config_keys,
            loader,
            instance: OnceCell::new(),
        }
    }

    /// The implementation, loading it on first use.
    pub fn instance(&self) -> &dyn Phase {
        self.instance.get_or_init(|| (self.loader)()).as_ref()
    }

    pub fn provides_keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.provides.iter().map(|d| d.key)
    }

    /// Declaration for one of this phase's provided keys.
    pub fn decl(&self, key: &str) -> Option<&ArtifactDecl> {
        self.provides.iter().find(|d| d.key == key)
    }
}

impl Clone for PhaseSpec {
    fn clone(&self) -> Self {
        // The memoized instance is deliberately not cloned; the copy loads
        // its own on first use.
        Self {
            name: self.name,
            version: self.version.clone(),
            label: self.label,
            requires: self.requires.clone(),
            provides: self.provides.clone(),
            config_keys: self.config_keys,
            loader: self.loader,
            instance: OnceCell::new(),
        }
    }
}

impl std::fmt::Debug for PhaseSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("requires", &self.requires)
            .field(
                "provides",
                &self.provides.iter().map(|d| d.key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A declarative pause point after a named phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSpec {
    pub key: &'static str,
    pub after_phase: &'static str,
    pub label: &'static str,
}

/// Presentational grouping of phases for status views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub phases: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static LOADS: AtomicUsize = AtomicUsize::new(0);

    struct NoopPhase;

    impl Phase for NoopPhase {
        fn run(
            &self,
            _ctx: &RunContext,
            _inputs: &BTreeMap<String, Artifact>,
            _outputs: &ResolvedOutputs,
        ) -> Result<PhaseResult> {
            Ok(PhaseResult::succeeded(Vec::new()))
        }
    }

    fn counting_loader() -> Box<dyn Phase> {
        LOADS.fetch_add(1, Ordering::SeqCst);
        Box::new(NoopPhase)
    }

    fn spec() -> PhaseSpec {
        PhaseSpec::new(
            "extract",
            "1.0.0",
            "Audio extraction",
            vec![],
            vec![ArtifactDecl {
                key: "extract.audio",
                kind: ArtifactKind::Wav,
                relpath: "audio/audio_raw.wav",
            }],
            &[],
            counting_loader,
        )
    }

    #[test]
    fn loader_runs_once_per_spec() {
        let spec = spec();
        let before = LOADS.load(Ordering::SeqCst);
        spec.instance();
        spec.instance();
        assert_eq!(LOADS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn clone_resets_the_memoized_instance() {
        let spec = spec();
        spec.instance();
        let clone = spec.clone();
        let before = LOADS.load(Ordering::SeqCst);
        clone.instance();
        assert_eq!(LOADS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn resolved_outputs_require_names_the_key() {
        let mut outputs = ResolvedOutputs::default();
        outputs.insert("mix.audio", Utf8PathBuf::from("/ws/mix/dub_audio.wav"));

        assert!(outputs.require("mix.audio").is_ok());
        let err = outputs.require("burn.video").unwrap_err();
        assert!(err.to_string().contains("burn.video"));
    }

    #[test]
    fn failed_result_carries_error_info() {
        let result = PhaseResult::failed("IOError", "source track missing");
        assert_eq!(result.status, PhaseOutcome::Failed);
        let error = result.error.unwrap();
        assert_eq!(error.kind, "IOError");
        assert!(error.message.contains("source track"));
    }
}
