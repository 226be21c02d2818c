//! The CalDoc: the editable intermediate document threaded through the
//! pipeline.
//!
//! One phase produces it from non-editable upstream inputs, a human mutates
//! it through the external editor, and later phases read it back. Its
//! content fingerprint covers a canonical encoding of the segments rather
//! than raw file bytes, so cosmetic JSON reformatting never invalidates caches
//! while any edit to the fields that matter does.

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dubflow_utils::atomic_write::write_text_atomic;
use dubflow_utils::fingerprint::hash_bytes;

/// Artifact key the CalDoc is registered under.
pub const CALDOC_KEY: &str = "state.caldoc";

/// Current CalDoc schema version.
pub const CALDOC_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum CalDocError {
    #[error("Failed to read CalDoc {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CalDoc is corrupt ({path}): {reason}")]
    Corrupt { path: Utf8PathBuf, reason: String },

    #[error("Failed to write CalDoc {path}: {reason}")]
    Write { path: Utf8PathBuf, reason: String },
}

/// Per-segment markers set by tooling and reviewers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentFlags {
    /// Adjacent segments' time ranges intersect.
    pub overlap: bool,
    pub needs_review: bool,
}

/// One calibration segment.
///
/// `id` is a stable random token that survives edits and splits; it is part
/// of the content fingerprint, timing and text are too, `flags` and
/// `tts_policy` are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    #[serde(default)]
    pub text_translated: String,
    pub speaker: String,
    #[serde(default = "default_emotion")]
    pub emotion: String,
    #[serde(default = "default_segment_type", rename = "type")]
    pub segment_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tts_policy: Option<serde_json::Value>,
    #[serde(default)]
    pub flags: SegmentFlags,
}

fn default_emotion() -> String {
    "neutral".to_string()
}

fn default_segment_type() -> String {
    "speech".to_string()
}

/// Generate a segment id: `seg_` plus eight hex chars.
pub fn gen_segment_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("seg_{}", &hex[..8])
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaInfo {
    pub duration_ms: u64,
}

/// Edit history metadata. `rev` increments on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct History {
    pub rev: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Fingerprint of the upstream input the producer built this document
    /// from. An unchanged upstream means an existing document must not be
    /// overwritten.
    pub source_fingerprint: String,
}

impl Default for History {
    fn default() -> Self {
        Self {
            rev: 0,
            created_at: None,
            updated_at: None,
            source_fingerprint: String::new(),
        }
    }
}

/// Self-describing content fingerprint embedded in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintInfo {
    pub algo: String,
    pub value: String,
    pub scope: String,
}

impl Default for FingerprintInfo {
    fn default() -> Self {
        Self {
            algo: "sha256".to_string(),
            value: String::new(),
            scope: "segments".to_string(),
        }
    }
}

/// The calibration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalDoc {
    pub schema_version: u32,
    #[serde(default)]
    pub media: MediaInfo,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub fingerprint: FingerprintInfo,
}

impl CalDoc {
    /// Fresh document for a producer phase. `rev` starts at zero and the
    /// first save moves it to one.
    pub fn new(duration_ms: u64, source_fingerprint: &str) -> Self {
        Self {
            schema_version: CALDOC_SCHEMA_VERSION,
            media: MediaInfo { duration_ms },
            segments: Vec::new(),
            history: History {
                rev: 0,
                created_at: Some(Utc::now()),
                updated_at: None,
                source_fingerprint: source_fingerprint.to_string(),
            },
            fingerprint: FingerprintInfo::default(),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, CalDocError> {
        let content =
            std::fs::read_to_string(path.as_std_path()).map_err(|source| CalDocError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let doc: CalDoc = serde_json::from_str(&content).map_err(|e| CalDocError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if doc.schema_version != CALDOC_SCHEMA_VERSION {
            return Err(CalDocError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported schema_version {} (expected {})",
                    doc.schema_version, CALDOC_SCHEMA_VERSION
                ),
            });
        }
        Ok(doc)
    }

    /// Save: refresh overlap flags, bump the revision, recompute the
    /// embedded fingerprint, and atomically write pretty JSON (the file is
    /// edited by humans).
    pub fn save(&mut self, path: &Utf8Path) -> Result<(), CalDocError> {
        self.detect_overlaps();
        self.history.rev += 1;
        self.history.updated_at = Some(Utc::now());
        self.fingerprint.value = self.compute_fingerprint();

        let json = serde_json::to_string_pretty(self).map_err(|e| CalDocError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_text_atomic(path, &json).map_err(|e| CalDocError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Canonical content fingerprint: per segment
    /// `id|start_ms|end_ms|text|text_translated|speaker|emotion`, segments
    /// joined by `\n` in file order, SHA-256 over the UTF-8 bytes.
    pub fn compute_fingerprint(&self) -> String {
        let parts: Vec<String> = self
            .segments
            .iter()
            .map(|seg| {
                format!(
                    "{}|{}|{}|{}|{}|{}|{}",
                    seg.id,
                    seg.start_ms,
                    seg.end_ms,
                    seg.text,
                    seg.text_translated,
                    seg.speaker,
                    seg.emotion
                )
            })
            .collect();
        hash_bytes(parts.join("\n").as_bytes())
    }

    /// Mark `flags.overlap` on every segment whose time range intersects a
    /// neighbor's. Pure over segments; does not touch the fingerprint.
    pub fn detect_overlaps(&mut self) {
        for seg in &mut self.segments {
            seg.flags.overlap = false;
        }
        let mut order: Vec<usize> = (0..self.segments.len()).collect();
        order.sort_by_key(|&i| self.segments[i].start_ms);
        for pair in order.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            if self.segments[next].start_ms < self.segments[prev].end_ms {
                self.segments[prev].flags.overlap = true;
                self.segments[next].flags.overlap = true;
            }
        }
    }
}

/// Canonical fingerprint of the CalDoc stored at `path`.
///
/// This is what consumers (and the runner) use wherever the CalDoc appears
/// in a `requires` list.
pub fn fingerprint_file(path: &Utf8Path) -> Result<String, CalDocError> {
    Ok(CalDoc::load(path)?.compute_fingerprint())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seg(id: &str, start_ms: u64, end_ms: u64, text: &str) -> Segment {
        Segment {
            id: id.to_string(),
            start_ms,
            end_ms,
            text: text.to_string(),
            text_translated: String::new(),
            speaker: "spk_0".to_string(),
            emotion: "neutral".to_string(),
            segment_type: "speech".to_string(),
            tts_policy: None,
            flags: SegmentFlags::default(),
        }
    }

    fn doc_path(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join("caldoc.json")).unwrap()
    }

    #[test]
    fn rev_is_strictly_increasing_across_saves() {
        let dir = TempDir::new().unwrap();
        let path = doc_path(&dir);
        let mut doc = CalDoc::new(60_000, "fp");
        doc.segments.push(seg("seg_00000001", 0, 1000, "hello"));

        doc.save(&path).unwrap();
        assert_eq!(doc.history.rev, 1);

        let mut reloaded = CalDoc::load(&path).unwrap();
        reloaded.save(&path).unwrap();
        assert_eq!(reloaded.history.rev, 2);

        let again = CalDoc::load(&path).unwrap();
        assert_eq!(again.history.rev, 2);
    }

    #[test]
    fn fingerprint_ignores_flags_and_policy() {
        let mut a = CalDoc::new(1000, "fp");
        a.segments.push(seg("seg_00000001", 0, 500, "one"));
        let before = a.compute_fingerprint();

        a.segments[0].flags.needs_review = true;
        a.segments[0].tts_policy = Some(serde_json::json!({"rate": 1.2}));
        assert_eq!(a.compute_fingerprint(), before);
    }

    #[test]
    fn fingerprint_tracks_text_edits() {
        let mut doc = CalDoc::new(1000, "fp");
        doc.segments.push(seg("seg_00000001", 0, 500, "one"));
        let before = doc.compute_fingerprint();

        doc.segments[0].text = "two".to_string();
        assert_ne!(doc.compute_fingerprint(), before);
    }

    #[test]
    fn fingerprint_survives_cosmetic_reformatting() {
        let dir = TempDir::new().unwrap();
        let path = doc_path(&dir);
        let mut doc = CalDoc::new(1000, "fp");
        doc.segments.push(seg("seg_00000001", 0, 500, "one"));
        doc.save(&path).unwrap();
        let canonical = fingerprint_file(&path).unwrap();

        // Rewrite the file compact instead of pretty.
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();

        assert_eq!(fingerprint_file(&path).unwrap(), canonical);
    }

    #[test]
    fn saved_fingerprint_matches_canonical_recomputation() {
        let dir = TempDir::new().unwrap();
        let path = doc_path(&dir);
        let mut doc = CalDoc::new(1000, "fp");
        doc.segments.push(seg("seg_00000001", 0, 500, "one"));
        doc.save(&path).unwrap();

        let loaded = CalDoc::load(&path).unwrap();
        assert_eq!(loaded.fingerprint.value, loaded.compute_fingerprint());
        assert_eq!(loaded.fingerprint.algo, "sha256");
        assert_eq!(loaded.fingerprint.scope, "segments");
    }

    #[test]
    fn overlap_detection_marks_both_neighbors() {
        let mut doc = CalDoc::new(10_000, "fp");
        doc.segments.push(seg("seg_a", 0, 1200, "a"));
        doc.segments.push(seg("seg_b", 1000, 2000, "b"));
        doc.segments.push(seg("seg_c", 2500, 3000, "c"));

        doc.detect_overlaps();

        assert!(doc.segments[0].flags.overlap);
        assert!(doc.segments[1].flags.overlap);
        assert!(!doc.segments[2].flags.overlap);
    }

    #[test]
    fn overlap_flags_reset_when_edit_fixes_timing() {
        let mut doc = CalDoc::new(10_000, "fp");
        doc.segments.push(seg("seg_a", 0, 1200, "a"));
        doc.segments.push(seg("seg_b", 1000, 2000, "b"));
        doc.detect_overlaps();
        assert!(doc.segments[0].flags.overlap);

        doc.segments[1].start_ms = 1200;
        doc.detect_overlaps();
        assert!(!doc.segments[0].flags.overlap);
        assert!(!doc.segments[1].flags.overlap);
    }

    #[test]
    fn unknown_schema_version_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = doc_path(&dir);
        std::fs::write(&path, r#"{"schema_version": 9}"#).unwrap();

        assert!(matches!(
            CalDoc::load(&path),
            Err(CalDocError::Corrupt { .. })
        ));
    }

    #[test]
    fn generated_ids_are_well_formed_and_distinct() {
        let a = gen_segment_id();
        let b = gen_segment_id();
        assert!(a.starts_with("seg_"));
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }
}
