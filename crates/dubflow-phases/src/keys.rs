//! Artifact key constants shared across phases.

pub const EXTRACT_AUDIO: &str = "extract.audio";
pub const ASR_RESULT: &str = "asr.asr_result";
pub const SUBTITLE_MODEL: &str = "subs.subtitle_model";
pub const SRC_SRT: &str = "subs.src_srt";
pub const CALDOC: &str = dubflow_caldoc::CALDOC_KEY;
pub const MT_OUTPUT: &str = "mt.mt_output";
pub const EN_SRT: &str = "subs.en_srt";
pub const DUB_MANIFEST: &str = "dub.dub_manifest";
pub const TTS_SEGMENTS_DIR: &str = "tts.segments_dir";
pub const TTS_REPORT: &str = "tts.report";
pub const MIX_AUDIO: &str = "mix.audio";
pub const BURN_VIDEO: &str = "burn.video";
