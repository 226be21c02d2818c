//! Command-line surface: `run`, `bless`, `phases`, `status`, `gate`,
//! `serve`.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use dubflow_config::PipelineConfig;
use dubflow_manifest::Manifest;
use dubflow_phases::{GATES, STAGES, registry};
use dubflow_runner::{LaunchOptions, RunnerError, TracingSink, bless, run_video};
use dubflow_stream::{AppState, pipeline_status_for};
use dubflow_utils::paths;

#[derive(Debug, Parser)]
#[command(
    name = "dubflow",
    version,
    about = "Incremental content-addressed pipeline runner for video dubbing"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run pipeline phases for a video. Exits 0 on success or at a gate.
    Run {
        /// Source video file.
        video: Utf8PathBuf,
        /// Force refresh from this phase (inclusive).
        #[arg(long = "from")]
        from: Option<String>,
        /// Target phase to run up to (inclusive).
        #[arg(long = "to")]
        to: Option<String>,
        /// Config file (defaults to <workspace>/dubflow.toml when present).
        #[arg(long)]
        config: Option<Utf8PathBuf>,
    },

    /// Accept manual edits: re-fingerprint a phase's output artifacts
    /// without re-running it.
    Bless {
        video: Utf8PathBuf,
        /// Phase whose outputs to re-fingerprint.
        phase: String,
    },

    /// List registered phases with versions, requires, and provides.
    Phases,

    /// Print the phase, gate, and stage tables for a workspace.
    Status { video: Utf8PathBuf },

    /// Gate operations.
    Gate {
        video: Utf8PathBuf,
        #[command(subcommand)]
        action: GateAction,
    },

    /// Serve the streaming execution API.
    Serve {
        /// Directory holding source videos.
        #[arg(long, default_value = ".")]
        videos_dir: Utf8PathBuf,
        #[arg(long, default_value_t = 8787)]
        port: u16,
        #[arg(long)]
        config: Option<Utf8PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum GateAction {
    /// Move a gate to `passed` so the next run continues beyond it.
    Pass { key: String },
}

/// Execute the parsed command; returns the process exit code.
pub async fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            video,
            from,
            to,
            config,
        } => run_cmd(&video, from.as_deref(), to.as_deref(), config),
        Command::Bless { video, phase } => bless_cmd(&video, &phase),
        Command::Phases => {
            phases_cmd();
            Ok(0)
        }
        Command::Status { video } => status_cmd(&video),
        Command::Gate { video, action } => match action {
            GateAction::Pass { key } => gate_pass_cmd(&video, &key),
        },
        Command::Serve {
            videos_dir,
            port,
            config,
        } => {
            let config = load_config(config.as_ref(), None)?;
            let state = AppState::new(videos_dir, config);
            dubflow_stream::serve(state, port).await?;
            Ok(0)
        }
    }
}

/// Config resolution: an explicit `--config` wins, otherwise the workspace
/// file when one exists, otherwise defaults.
fn load_config(
    explicit: Option<&Utf8PathBuf>,
    workspace: Option<&Utf8PathBuf>,
) -> Result<PipelineConfig> {
    let path = match explicit {
        Some(path) => Some(path.clone()),
        None => workspace
            .map(|ws| ws.join("dubflow.toml"))
            .filter(|p| p.as_std_path().is_file()),
    };
    Ok(PipelineConfig::load(path.as_deref())?)
}

fn run_cmd(
    video: &Utf8PathBuf,
    from: Option<&str>,
    to: Option<&str>,
    config: Option<Utf8PathBuf>,
) -> Result<i32> {
    if !video.as_std_path().is_file() {
        bail!("No video file found at: {video}");
    }
    let workspace = paths::workspace_for_video(video);
    let config = load_config(config.as_ref(), Some(&workspace))?;

    let result = run_video(
        &registry(),
        GATES,
        &config,
        video,
        LaunchOptions { from, to },
        &TracingSink,
        None,
    );

    match result {
        Ok(summary) => {
            let executed = summary.phases.iter().filter(|p| !p.skipped).count();
            let skipped = summary.phases.len() - executed;
            println!("Pipeline completed: {executed} executed, {skipped} skipped");
            if let Some(gate) = summary.halted_at_gate {
                println!("Halted at gate '{gate}'; pass it to continue");
            }
            Ok(0)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(e.exit_code())
        }
    }
}

fn bless_cmd(video: &Utf8PathBuf, phase: &str) -> Result<i32> {
    let workspace = paths::workspace_for_video(video);
    let manifest_path = paths::manifest_path(&workspace);
    if !manifest_path.as_std_path().is_file() {
        bail!("Manifest not found: {manifest_path}");
    }

    let mut manifest = Manifest::load(&manifest_path)?;
    match bless(&mut manifest, &workspace, &registry(), phase) {
        Ok(updated) if updated.is_empty() => {
            println!("All artifacts for phase '{phase}' are unchanged");
            Ok(0)
        }
        Ok(updated) => {
            for blessed in &updated {
                println!(
                    "  {}: {}... -> {}...",
                    blessed.key,
                    &blessed.old_fingerprint[..16.min(blessed.old_fingerprint.len())],
                    &blessed.new_fingerprint[..16]
                );
            }
            println!("Blessed {} artifact(s) for phase '{phase}'", updated.len());
            Ok(0)
        }
        Err(e @ RunnerError::UnknownPhase { .. }) => {
            eprintln!("error: {e}");
            Ok(e.exit_code())
        }
        Err(e) => Err(e.into()),
    }
}

fn phases_cmd() {
    println!("Available phases:");
    for spec in registry() {
        let provides: Vec<&str> = spec.provides_keys().collect();
        println!(
            "  - {} (v{}): requires={:?}, provides={provides:?}",
            spec.name, spec.version, spec.requires
        );
    }
    println!("\nGates:");
    for gate in GATES {
        println!("  - {} (after {}): {}", gate.key, gate.after_phase, gate.label);
    }
}

fn status_cmd(video: &Utf8PathBuf) -> Result<i32> {
    let workspace = paths::workspace_for_video(video);
    let status = pipeline_status_for(&workspace, &registry(), GATES, STAGES)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&status).context("Failed to render status")?
    );
    Ok(0)
}

fn gate_pass_cmd(video: &Utf8PathBuf, key: &str) -> Result<i32> {
    if !GATES.iter().any(|g| g.key == key) {
        bail!("Unknown gate: {key}");
    }
    let workspace = paths::workspace_for_video(video);
    let manifest_path = paths::manifest_path(&workspace);
    if !manifest_path.as_std_path().is_file() {
        bail!("Manifest not found: {manifest_path}");
    }

    let mut manifest = Manifest::load(&manifest_path)?;
    manifest.pass_gate(key);
    manifest.save()?;
    println!("Gate '{key}' passed");
    Ok(0)
}
