//! Shared fixtures for the pipeline integration suites.

use camino::Utf8PathBuf;
use tempfile::TempDir;

use dubflow_config::PipelineConfig;
use dubflow_manifest::Manifest;
use dubflow_phase_api::PhaseSpec;
use dubflow_runner::{LaunchOptions, NullSink, RunSummary, RunnerError, run_video};

pub struct TestWorkspace {
    pub _dir: TempDir,
    pub video: Utf8PathBuf,
    pub workspace: Utf8PathBuf,
}

/// A videos directory holding one placeholder source video.
pub fn setup() -> TestWorkspace {
    let dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let video = root.join("episode.mp4");
    std::fs::write(
        video.as_std_path(),
        b"not really an mp4, but stable bytes for the pipeline",
    )
    .unwrap();
    let workspace = dubflow_utils::paths::workspace_for_video(&video);
    TestWorkspace {
        _dir: dir,
        video,
        workspace,
    }
}

pub fn run(
    ws: &TestWorkspace,
    config: &PipelineConfig,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<RunSummary, RunnerError> {
    run_with_registry(&dubflow_phases::registry(), ws, config, from, to)
}

pub fn run_with_registry(
    registry: &[PhaseSpec],
    ws: &TestWorkspace,
    config: &PipelineConfig,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<RunSummary, RunnerError> {
    run_video(
        registry,
        dubflow_phases::GATES,
        config,
        &ws.video,
        LaunchOptions { from, to },
        &NullSink,
        None,
    )
}

pub fn load_manifest(ws: &TestWorkspace) -> Manifest {
    Manifest::load(&dubflow_utils::paths::manifest_path(&ws.workspace)).unwrap()
}

/// Names of the phases a summary actually executed (not skipped).
pub fn executed(summary: &RunSummary) -> Vec<&str> {
    summary
        .phases
        .iter()
        .filter(|p| !p.skipped)
        .map(|p| p.name.as_str())
        .collect()
}

/// Names of the phases a summary skipped.
pub fn skipped(summary: &RunSummary) -> Vec<&str> {
    summary
        .phases
        .iter()
        .filter(|p| p.skipped)
        .map(|p| p.name.as_str())
        .collect()
}
