//! Status view: phase and gate tables plus the derived stage grouping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use camino::Utf8Path;
use dubflow_manifest::{ErrorInfo, Manifest, PhaseStatus};
use dubflow_phase_api::{GateSpec, PhaseSpec, StageSpec};

#[derive(Debug, Clone, Serialize)]
pub struct PhaseView {
    pub name: String,
    pub label: String,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub skipped: bool,
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateView {
    pub key: String,
    pub after: String,
    pub label: String,
    pub status: dubflow_manifest::GateStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageView {
    pub key: String,
    pub label: String,
    pub phases: Vec<String>,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub has_manifest: bool,
    pub phases: Vec<PhaseView>,
    pub gates: Vec<GateView>,
    pub stages: Vec<StageView>,
}

/// Build the status view for one workspace.
pub fn pipeline_status_for(
    workspace: &Utf8Path,
    registry: &[PhaseSpec],
    gates: &[GateSpec],
    stages: &[StageSpec],
) -> Result<PipelineStatus, dubflow_manifest::ManifestError> {
    let manifest_path = dubflow_utils::paths::manifest_path(workspace);
    let has_manifest = manifest_path.as_std_path().is_file();
    let manifest = Manifest::load(&manifest_path)?;

    let phases: Vec<PhaseView> = registry
        .iter()
        .map(|spec| match manifest.get_phase(spec.name) {
            Some(record) => PhaseView {
                name: spec.name.to_string(),
                label: spec.label.to_string(),
                status: record.status,
                started_at: record.started_at,
                finished_at: record.finished_at,
                skipped: record.skipped,
                metrics: record.metrics.clone(),
                error: record.error.clone(),
            },
            None => PhaseView {
                name: spec.name.to_string(),
                label: spec.label.to_string(),
                status: PhaseStatus::Pending,
                started_at: None,
                finished_at: None,
                skipped: false,
                metrics: BTreeMap::new(),
                error: None,
            },
        })
        .collect();

    let gates = gates
        .iter()
        .map(|gate| GateView {
            key: gate.key.to_string(),
            after: gate.after_phase.to_string(),
            label: gate.label.to_string(),
            status: manifest.gate_status(gate.key),
        })
        .collect();

    let stages = stages.iter().map(|s| derive_stage(s, &phases)).collect();

    Ok(PipelineStatus {
        has_manifest,
        phases,
        gates,
        stages,
    })
}

/// Stage status from its member phases: failed beats running beats
/// pending; a stage succeeds only when every member succeeded or skipped.
fn derive_stage(stage: &StageSpec, phases: &[PhaseView]) -> StageView {
    let members: Vec<&PhaseView> = stage
        .phases
        .iter()
        .filter_map(|name| phases.iter().find(|p| p.name == *name))
        .collect();

    let status = if members.iter().any(|p| p.status == PhaseStatus::Failed) {
        PhaseStatus::Failed
    } else if members.iter().any(|p| p.status == PhaseStatus::Running) {
        PhaseStatus::Running
    } else if !members.is_empty()
        && members
            .iter()
            .all(|p| matches!(p.status, PhaseStatus::Succeeded | PhaseStatus::Skipped))
    {
        PhaseStatus::Succeeded
    } else {
        PhaseStatus::Pending
    };

    StageView {
        key: stage.key.to_string(),
        label: stage.label.to_string(),
        phases: stage.phases.iter().map(|p| p.to_string()).collect(),
        status,
    }
}
