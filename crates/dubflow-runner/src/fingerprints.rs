//! On-disk fingerprints of registered artifacts.
//!
//! One dispatch used everywhere the runner compares disk against the
//! manifest (the recompute step, the skip decision, commit, and bless):
//! directory artifacts hash their canonical listing, the CalDoc hashes its
//! canonical segment encoding (so cosmetic JSON reformatting never
//! invalidates caches), everything else hashes raw bytes.

use anyhow::Result;
use camino::Utf8Path;

use dubflow_caldoc::CALDOC_KEY;
use dubflow_manifest::{Artifact, ArtifactKind};
use dubflow_utils::fingerprint::{hash_dir, hash_file};

/// Current fingerprint of `artifact`'s file in `workspace`.
pub fn artifact_fingerprint(workspace: &Utf8Path, artifact: &Artifact) -> Result<String> {
    let path = workspace.join(&artifact.relpath);
    if artifact.key == CALDOC_KEY {
        return Ok(dubflow_caldoc::fingerprint_file(&path)?);
    }
    match artifact.kind {
        ArtifactKind::Dir => hash_dir(&path),
        _ => hash_file(&path),
    }
}
