//! Atomic file operations: temp file + fsync + rename.
//!
//! Every persistent write in the pipeline goes through here: manifest
//! saves, artifact commits, CalDoc saves. The temp file is created in the
//! target's directory so the final rename stays on one filesystem.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Atomically write raw bytes to `path`.
///
/// Writes to a randomly named temp file next to the target, fsyncs it, then
/// renames over the target. If anything fails after the temp file exists,
/// the temp file is removed on drop and the target is left untouched.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {parent}"))?;
    }

    let temp_dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut temp_file = NamedTempFile::new_in(temp_dir)
        .with_context(|| format!("Failed to create temporary file in: {temp_dir}"))?;

    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write content for: {path}"))?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("Failed to fsync temporary file for: {path}"))?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::anyhow!(e.error))
        .with_context(|| format!("Failed to atomically rename into place: {path}"))?;

    Ok(())
}

/// Atomically write a UTF-8 string to `path`.
pub fn write_text_atomic(path: &Utf8Path, content: &str) -> Result<()> {
    write_bytes_atomic(path, content.as_bytes())
}
