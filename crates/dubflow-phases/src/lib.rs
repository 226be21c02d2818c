//! Phase registry for the dubbing pipeline.
//!
//! Nine phases in a fixed linear order, each declared as a [`PhaseSpec`]
//! with static metadata; implementations load lazily on first execution.
//! Gate and stage declarations live here too: gates are activated per
//! workspace through configuration, stages are a purely presentational
//! grouping for status views.

pub mod keys;
pub mod model;
pub mod processors;

mod align;
mod asr;
mod burn;
mod extract;
mod mix;
mod mt;
mod parse;
mod reseg;
mod support;
mod tts;

use dubflow_manifest::ArtifactKind;
use dubflow_phase_api::{ArtifactDecl, GateSpec, PhaseSpec, StageSpec};

use keys::*;

/// The ordered phase registry.
///
/// The `(provides → requires)` graph over these specs is acyclic and this
/// vector is its linearization; the planner and runner both iterate it in
/// order.
pub fn registry() -> Vec<PhaseSpec> {
    vec![
        PhaseSpec::new(
            "extract",
            "1.0.0",
            "Audio extraction",
            vec![],
            vec![ArtifactDecl {
                key: EXTRACT_AUDIO,
                kind: ArtifactKind::Wav,
                relpath: "audio/audio_raw.wav",
            }],
            &[],
            || Box::new(extract::ExtractPhase),
        ),
        PhaseSpec::new(
            "asr",
            "1.0.0",
            "Speech recognition",
            vec![EXTRACT_AUDIO],
            vec![ArtifactDecl {
                key: ASR_RESULT,
                kind: ArtifactKind::Json,
                relpath: "source/asr-result.json",
            }],
            &["asr_preset", "asr_hotwords"],
            || Box::new(asr::AsrPhase),
        ),
        PhaseSpec::new(
            "parse",
            "1.0.0",
            "Subtitle segmentation",
            vec![ASR_RESULT],
            vec![
                ArtifactDecl {
                    key: SUBTITLE_MODEL,
                    kind: ArtifactKind::Json,
                    relpath: "subs/subtitle_model.json",
                },
                ArtifactDecl {
                    key: SRC_SRT,
                    kind: ArtifactKind::Srt,
                    relpath: "subs/source.srt",
                },
            ],
            &["sub_postprofile", "utt_min_duration_ms", "utt_max_duration_ms"],
            || Box::new(parse::ParsePhase),
        ),
        PhaseSpec::new(
            "reseg",
            "1.0.0",
            "Re-segmentation",
            vec![SUBTITLE_MODEL],
            vec![ArtifactDecl {
                key: CALDOC,
                kind: ArtifactKind::Json,
                relpath: "state/caldoc.json",
            }],
            &[
                "reseg_enabled",
                "reseg_min_chars",
                "reseg_max_chars_trigger",
                "reseg_max_duration_trigger_ms",
            ],
            || Box::new(reseg::ResegPhase),
        ),
        PhaseSpec::new(
            "mt",
            "1.0.0",
            "Translation",
            vec![CALDOC],
            vec![ArtifactDecl {
                key: MT_OUTPUT,
                kind: ArtifactKind::Json,
                relpath: "mt/mt_output.json",
            }],
            &["mt_model", "mt_temperature", "mt_target_lang"],
            || Box::new(mt::MtPhase),
        ),
        PhaseSpec::new(
            "align",
            "1.0.0",
            "Alignment",
            vec![CALDOC, MT_OUTPUT, EXTRACT_AUDIO],
            vec![
                ArtifactDecl {
                    key: EN_SRT,
                    kind: ArtifactKind::Srt,
                    relpath: "subs/target.srt",
                },
                ArtifactDecl {
                    key: DUB_MANIFEST,
                    kind: ArtifactKind::Json,
                    relpath: "dub/dub_manifest.json",
                },
            ],
            &[],
            || Box::new(align::AlignPhase),
        ),
        PhaseSpec::new(
            "tts",
            "1.1.0",
            "Speech synthesis",
            vec![DUB_MANIFEST, EN_SRT],
            vec![
                ArtifactDecl {
                    key: TTS_SEGMENTS_DIR,
                    kind: ArtifactKind::Dir,
                    relpath: "tts/segments",
                },
                ArtifactDecl {
                    key: TTS_REPORT,
                    kind: ArtifactKind::Json,
                    relpath: "tts/report.json",
                },
            ],
            &["tts_engine", "tts_max_workers", "tts_volume"],
            || Box::new(tts::TtsPhase),
        ),
        PhaseSpec::new(
            "mix",
            "1.0.0",
            "Mixing",
            vec![DUB_MANIFEST, TTS_SEGMENTS_DIR, TTS_REPORT, EXTRACT_AUDIO],
            vec![ArtifactDecl {
                key: MIX_AUDIO,
                kind: ArtifactKind::Wav,
                relpath: "mix/dub_audio.wav",
            }],
            &["mix_target_lufs", "mix_true_peak_db", "tts_mute_original"],
            || Box::new(mix::MixPhase),
        ),
        PhaseSpec::new(
            "burn",
            "1.0.0",
            "Subtitle burn-in",
            vec![MIX_AUDIO, EN_SRT],
            vec![ArtifactDecl {
                key: BURN_VIDEO,
                kind: ArtifactKind::Mp4,
                relpath: "burn/output.mp4",
            }],
            &[],
            || Box::new(burn::BurnPhase),
        ),
    ]
}

/// Declared gates. A gate only opens when its key is listed in
/// `PipelineConfig::gates`.
pub const GATES: &[GateSpec] = &[
    GateSpec {
        key: "source_review",
        after_phase: "reseg",
        label: "Source subtitle review",
    },
    GateSpec {
        key: "dub_review",
        after_phase: "mix",
        label: "Dub review",
    },
];

/// User-facing stage grouping of the phase order.
pub const STAGES: &[StageSpec] = &[
    StageSpec {
        key: "source",
        label: "Source",
        phases: &["extract", "asr", "parse", "reseg"],
    },
    StageSpec {
        key: "translate",
        label: "Translate",
        phases: &["mt", "align"],
    },
    StageSpec {
        key: "dub",
        label: "Dub",
        phases: &["tts", "mix", "burn"],
    },
];
