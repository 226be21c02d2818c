//! Small helpers shared by phase implementations.

use anyhow::Result;
use camino::Utf8PathBuf;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::RunContext;

/// Absolute path of a required input artifact.
pub(crate) fn input_path(
    ctx: &RunContext,
    inputs: &BTreeMap<String, Artifact>,
    key: &str,
) -> Result<Utf8PathBuf> {
    let artifact = inputs
        .get(key)
        .ok_or_else(|| anyhow::anyhow!("Input artifact not resolved: {key}"))?;
    Ok(ctx.workspace.join(&artifact.relpath))
}
