//! SHA-256 fingerprints over files, directories, and canonical JSON.
//!
//! A fingerprint is a lowercase hex SHA-256 digest. For files it covers the
//! raw bytes; for directories, a sorted listing of descendant file
//! fingerprints; for derived values, the JCS-canonical JSON encoding. The
//! empty string is the "not yet computed" sentinel.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;

/// Sentinel for a fingerprint that has not been computed yet.
pub const EMPTY_FINGERPRINT: &str = "";

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 hex digest of a byte slice.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(hasher)
}

/// SHA-256 hex digest of a file's raw bytes, stream-read.
///
/// Symlinks are followed once (standard `File::open` resolution). A missing
/// or unreadable path is an error; the caller's phase fails.
pub fn hash_file(path: &Utf8Path) -> Result<String> {
    let mut file =
        File::open(path.as_std_path()).with_context(|| format!("Failed to open file: {path}"))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("Failed to read file: {path}"))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(hasher))
}

/// SHA-256 hex digest of a directory tree.
///
/// The digest covers one line per descendant file, sorted by relative path:
/// `relpath<TAB>file_fingerprint<LF>`. Relative paths use `/` separators on
/// every platform so the digest is portable.
pub fn hash_dir(path: &Utf8Path) -> Result<String> {
    let mut files = Vec::new();
    collect_files(path, path, &mut files)?;
    files.sort();

    let mut hasher = Sha256::new();
    for relpath in &files {
        let fp = hash_file(&path.join(relpath))?;
        hasher.update(relpath.as_str().as_bytes());
        hasher.update(b"\t");
        hasher.update(fp.as_bytes());
        hasher.update(b"\n");
    }
    Ok(hex_digest(hasher))
}

/// SHA-256 hex digest of a value's JCS-canonical JSON encoding.
pub fn hash_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value for hashing")?;
    let canonical = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON for hashing")?;
    Ok(hash_bytes(&canonical))
}

/// Combine an ordered list of `(key, fingerprint)` entries with extra
/// strings into one fingerprint.
///
/// This is how a phase's input fingerprint is built: the required artifacts
/// in declared order, then the phase version and its canonical config slice
/// as extras. Order is significant on both lists.
pub fn combined(entries: &[(String, String)], extras: &[String]) -> Result<String> {
    #[derive(Serialize)]
    struct Combined<'a> {
        entries: &'a [(String, String)],
        extras: &'a [String],
    }
    hash_json(&Combined { entries, extras })
}

fn collect_files(root: &Utf8Path, dir: &Utf8Path, out: &mut Vec<Utf8PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir.as_std_path())
        .with_context(|| format!("Failed to read directory: {dir}"))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read directory entry in: {dir}"))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|p| anyhow::anyhow!("Non-UTF-8 path under {dir}: {}", p.display()))?;
        // metadata() follows symlinks, so a linked file hashes as its target.
        let meta = std::fs::metadata(path.as_std_path())
            .with_context(|| format!("Failed to stat: {path}"))?;
        if meta.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .with_context(|| format!("Path escapes directory root: {path}"))?;
            out.push(rel.to_path_buf());
        }
    }
    Ok(())
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
