//! Bless: absorb out-of-band edits to a phase's output artifacts.
//!
//! For each artifact the phase last produced, recompute the fingerprint
//! from the current file bytes (recursively for directory kinds) and
//! replace the manifest record without re-running the phase. Downstream
//! phases then see a changed input fingerprint and re-execute on the next
//! run.

use anyhow::Context;
use camino::Utf8Path;

use dubflow_manifest::Manifest;
use dubflow_phase_api::PhaseSpec;

use crate::error::RunnerError;
use crate::fingerprints::artifact_fingerprint;

/// One artifact touched by a bless operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlessedArtifact {
    pub key: String,
    pub old_fingerprint: String,
    pub new_fingerprint: String,
}

/// Re-fingerprint `phase`'s outputs in place. Returns the artifacts whose
/// fingerprint actually changed; the manifest is saved only when at least
/// one did.
pub fn bless(
    manifest: &mut Manifest,
    workspace: &Utf8Path,
    registry: &[PhaseSpec],
    phase: &str,
) -> Result<Vec<BlessedArtifact>, RunnerError> {
    if !registry.iter().any(|spec| spec.name == phase) {
        return Err(RunnerError::UnknownPhase {
            name: phase.to_string(),
        });
    }

    let record = manifest
        .get_phase(phase)
        .with_context(|| format!("Phase '{phase}' has no record in the manifest"))?
        .clone();
    if record.output_keys.is_empty() {
        return Err(
            anyhow::anyhow!("Phase '{phase}' has no recorded output artifacts").into(),
        );
    }

    let mut updated = Vec::new();
    for key in &record.output_keys {
        let Some(artifact) = manifest.get_artifact(key).cloned() else {
            continue;
        };
        let new_fingerprint = artifact_fingerprint(workspace, &artifact)
            .with_context(|| format!("Failed to re-fingerprint artifact '{key}'"))?;
        if new_fingerprint == artifact.fingerprint {
            continue;
        }
        tracing::info!(
            key = %key,
            old = %&artifact.fingerprint[..16.min(artifact.fingerprint.len())],
            new = %&new_fingerprint[..16],
            "blessed artifact"
        );
        let mut replacement = artifact;
        updated.push(BlessedArtifact {
            key: key.clone(),
            old_fingerprint: replacement.fingerprint.clone(),
            new_fingerprint: new_fingerprint.clone(),
        });
        replacement.fingerprint = new_fingerprint;
        manifest.put_artifact(replacement);
    }

    if !updated.is_empty() {
        manifest.save()?;
    }
    Ok(updated)
}
