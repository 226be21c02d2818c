//! One-call pipeline launch for a source video.
//!
//! Shared by the CLI and the streaming API: derive the workspace, load the
//! manifest, plan, and run. Gate activation is configuration: only
//! declared gates whose key appears in `config.gates` are live for the
//! run.

use camino::Utf8Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use dubflow_config::PipelineConfig;
use dubflow_manifest::Manifest;
use dubflow_phase_api::{GateSpec, PhaseSpec, RunContext};
use dubflow_utils::paths;

use crate::error::RunnerError;
use crate::events::EventSink;
use crate::planner::build_plan;
use crate::runner::{PhaseRunner, RunSummary};

/// Range selection for one invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchOptions<'a> {
    pub from: Option<&'a str>,
    pub to: Option<&'a str>,
}

/// Run the pipeline for `video` up to the selected range.
pub fn run_video(
    registry: &[PhaseSpec],
    declared_gates: &[GateSpec],
    config: &PipelineConfig,
    video: &Utf8Path,
    options: LaunchOptions<'_>,
    sink: &dyn EventSink,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<RunSummary, RunnerError> {
    let workspace = paths::workspace_for_video(video);
    paths::ensure_layout(&workspace)?;

    let mut manifest = Manifest::load(&paths::manifest_path(&workspace))?;
    let job_id = uuid::Uuid::new_v4().to_string();
    manifest.set_job(&job_id, &workspace);
    manifest.save()?;

    let plan = build_plan(registry, &manifest, options.from, options.to)?;

    let gates: Vec<GateSpec> = declared_gates
        .iter()
        .filter(|gate| config.gates.iter().any(|key| key == gate.key))
        .copied()
        .collect();

    let ctx = RunContext {
        job_id,
        workspace,
        video_path: video.to_path_buf(),
        config: config.clone(),
    };

    let mut runner = PhaseRunner::new(registry, gates, manifest, ctx, sink);
    if let Some(cancel) = cancel {
        runner = runner.with_cancel_flag(cancel);
    }
    runner.run(&plan)
}
