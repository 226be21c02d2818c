//! Shared server state: configuration plus the per-episode run registry.

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use dubflow_config::PipelineConfig;

/// Handle to one live run. Dropping it does not stop the run; cancellation
/// is the cooperative flag.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub cancel: Arc<AtomicBool>,
}

/// Application state shared by all handlers.
///
/// `running` is the mutual-exclusion authority for a workspace: a second
/// run attempt for an episode that already has a handle fails with a
/// conflict. The manifest itself is deliberately not file-locked.
#[derive(Clone)]
pub struct AppState {
    pub videos_dir: Utf8PathBuf,
    pub config: PipelineConfig,
    pub running: Arc<Mutex<HashMap<String, RunHandle>>>,
}

impl AppState {
    pub fn new(videos_dir: Utf8PathBuf, config: PipelineConfig) -> Self {
        Self {
            videos_dir,
            config,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Claim the episode for a new run. Returns the handle, or `None` when
    /// a run is already live.
    pub fn try_claim(&self, episode: &str) -> Option<RunHandle> {
        let mut running = self.running.lock().ok()?;
        if running.contains_key(episode) {
            return None;
        }
        let handle = RunHandle {
            cancel: Arc::new(AtomicBool::new(false)),
        };
        running.insert(episode.to_string(), handle.clone());
        Some(handle)
    }

    /// Release the episode after its run finished.
    pub fn release(&self, episode: &str) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(episode);
        }
    }

    /// Handle of a live run, if any.
    pub fn live_handle(&self, episode: &str) -> Option<RunHandle> {
        self.running.lock().ok()?.get(episode).cloned()
    }

    /// Locate the source video for an episode.
    pub fn find_video(&self, episode: &str) -> Option<Utf8PathBuf> {
        for ext in ["mp4", "mkv", "avi"] {
            let candidate = self.videos_dir.join(format!("{episode}.{ext}"));
            if candidate.as_std_path().is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Workspace directory for an episode's video.
    pub fn workspace_for(&self, video: &Utf8Path) -> Utf8PathBuf {
        dubflow_utils::paths::workspace_for_video(video)
    }
}
