//! On-disk JSON documents exchanged between phases.
//!
//! Every document carries a `schema_version` header; readers reject
//! versions they do not understand instead of guessing.

use serde::{Deserialize, Serialize};

/// One recognized utterance in the ASR result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub speaker: String,
}

/// Raw recognition output, `source/asr-result.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrResult {
    pub schema_version: u32,
    pub duration_ms: u64,
    pub preset: String,
    pub utterances: Vec<Utterance>,
}

impl AsrResult {
    pub const SCHEMA_VERSION: u32 = 1;
}

/// One subtitle cue in the subtitle model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub cue_id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub speaker: String,
    pub text: String,
}

/// Segmented subtitles, `subs/subtitle_model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleModel {
    pub schema_version: u32,
    pub duration_ms: u64,
    pub cues: Vec<Cue>,
}

impl SubtitleModel {
    pub const SCHEMA_VERSION: u32 = 1;
}

/// Per-segment translation record in the MT output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub id: String,
    pub text: String,
    pub text_translated: String,
}

/// Translation output, `mt/mt_output.json`. Consumers look segments up by
/// id; the CalDoc itself is never written by this side of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtOutput {
    pub schema_version: u32,
    pub model: String,
    pub target_lang: String,
    pub segments: Vec<Translation>,
}

impl MtOutput {
    pub const SCHEMA_VERSION: u32 = 1;
}

/// One synthesis job in the dub manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubSegment {
    pub id: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    pub voice: String,
    /// Playback-rate adjustment chosen so the rendered line fits its slot.
    pub rate: f64,
}

/// Synthesis plan, `dub/dub_manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DubManifest {
    pub schema_version: u32,
    pub duration_ms: u64,
    pub segments: Vec<DubSegment>,
}

impl DubManifest {
    pub const SCHEMA_VERSION: u32 = 1;
}

/// One synthesized segment in the TTS report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedSegment {
    pub id: String,
    /// Filename inside the segments directory.
    pub file: String,
    pub duration_ms: u64,
    pub voice: String,
    pub rate: f64,
}

/// Synthesis report, `tts/report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsReport {
    pub schema_version: u32,
    pub engine: String,
    pub segments: Vec<SynthesizedSegment>,
}

impl TtsReport {
    pub const SCHEMA_VERSION: u32 = 1;
}

/// Read and schema-check a phase document.
pub fn read_document<T>(path: &camino::Utf8Path, expected_version: u32) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    use anyhow::Context;
    let content = std::fs::read_to_string(path.as_std_path())
        .with_context(|| format!("Failed to read document: {path}"))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("Malformed JSON: {path}"))?;
    let found = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64);
    if found != Some(u64::from(expected_version)) {
        anyhow::bail!(
            "Unsupported schema_version {:?} in {path} (expected {expected_version})",
            found
        );
    }
    serde_json::from_value(value).with_context(|| format!("Document shape mismatch: {path}"))
}

/// Serialize a phase document as pretty JSON and write it atomically.
pub fn write_document<T: Serialize>(path: &camino::Utf8Path, doc: &T) -> anyhow::Result<()> {
    use anyhow::Context;
    let json = serde_json::to_string_pretty(doc)
        .with_context(|| format!("Failed to serialize document: {path}"))?;
    dubflow_utils::atomic_write::write_text_atomic(path, &json)
}
