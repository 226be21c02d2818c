//! Workspace directory layout.
//!
//! A workspace holds everything for one video: per-phase-family subfolders,
//! the manifest at the top level, and the CalDoc at a fixed well-known path.
//! All paths recorded in the manifest are relative to the workspace root.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Manifest filename at the workspace root.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Workspace-relative path of the CalDoc.
pub const CALDOC_RELPATH: &str = "state/caldoc.json";

/// Subfolders created for a fresh workspace, one per phase family.
pub const WORKSPACE_DIRS: &[&str] = &[
    "source", "audio", "subs", "mt", "dub", "tts", "mix", "burn", "state",
];

/// Derive the workspace directory for a source video.
///
/// `videos/drama/3.mp4` maps to `videos/drama/dub/3/`.
pub fn workspace_for_video(video: &Utf8Path) -> Utf8PathBuf {
    let parent = video.parent().unwrap_or_else(|| Utf8Path::new("."));
    let stem = video.file_stem().unwrap_or("video");
    parent.join("dub").join(stem)
}

/// Absolute path of the manifest inside a workspace.
pub fn manifest_path(workspace: &Utf8Path) -> Utf8PathBuf {
    workspace.join(MANIFEST_FILE)
}

/// Absolute path of the CalDoc inside a workspace.
pub fn caldoc_path(workspace: &Utf8Path) -> Utf8PathBuf {
    workspace.join(CALDOC_RELPATH)
}

/// Create the workspace root and its phase-family subfolders.
pub fn ensure_layout(workspace: &Utf8Path) -> Result<()> {
    for dir in WORKSPACE_DIRS {
        let path = workspace.join(dir);
        fs::create_dir_all(path.as_std_path())
            .with_context(|| format!("Failed to create workspace directory: {path}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn workspace_is_sibling_dub_folder() {
        let ws = workspace_for_video(Utf8Path::new("videos/drama/3.mp4"));
        assert_eq!(ws, Utf8PathBuf::from("videos/drama/dub/3"));
    }

    #[test]
    fn workspace_for_bare_filename() {
        let ws = workspace_for_video(Utf8Path::new("clip.mkv"));
        assert_eq!(ws, Utf8PathBuf::from("dub/clip"));
    }

    #[test]
    fn ensure_layout_creates_all_families() {
        let dir = TempDir::new().unwrap();
        let ws = Utf8PathBuf::from_path_buf(dir.path().join("ws")).unwrap();

        ensure_layout(&ws).unwrap();

        for sub in WORKSPACE_DIRS {
            assert!(ws.join(sub).as_std_path().is_dir(), "missing {sub}");
        }
    }
}
