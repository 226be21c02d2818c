//! Runner-visible error taxonomy.
//!
//! Everything here surfaces at the API boundary; nothing is silently
//! recovered. The manifest keeps the last observed state of each phase; a
//! failed record stays failed until a successful rerun replaces it.

use dubflow_manifest::ManifestError;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// `--from` or `--to` names a phase the registry does not know.
    #[error("Unknown phase: {name}")]
    UnknownPhase { name: String },

    /// A required artifact was not in the manifest.
    #[error("Missing input artifact '{key}' required by phase '{phase}'")]
    MissingInput { key: String, phase: String },

    /// Strict mode only: an input's on-disk fingerprint differs from its
    /// manifest record. Default mode updates the record and continues.
    #[error(
        "Fingerprint mismatch for artifact '{key}': manifest has {recorded}, disk has {actual}"
    )]
    FingerprintMismatch {
        key: String,
        recorded: String,
        actual: String,
    },

    /// A phase reported failure; its record holds the detail verbatim.
    #[error("Phase '{phase}' failed: {message}")]
    PhaseExecution { phase: String, message: String },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The cooperative cancel flag was set between phases.
    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunnerError {
    /// Process exit code for the CLI: phase failures and infrastructure
    /// errors are 1, planning mistakes are 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::UnknownPhase { .. } => 2,
            _ => 1,
        }
    }
}
