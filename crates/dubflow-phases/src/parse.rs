//! Parse phase: turn raw recognition output into the subtitle model.
//!
//! Consecutive utterances from the same speaker merge into one cue while
//! they fit the configured duration window; undersized cues fold into their
//! predecessor. The cue list and a source-language SRT rendering are the
//! outputs.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};
use dubflow_utils::atomic_write::write_text_atomic;

use crate::keys::{ASR_RESULT, SRC_SRT, SUBTITLE_MODEL};
use crate::model::{AsrResult, Cue, SubtitleModel, read_document, write_document};
use crate::processors::srt::{self, SrtCue};
use crate::support::input_path;

pub struct ParsePhase;

impl Phase for ParsePhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let asr: AsrResult = read_document(
            &input_path(ctx, inputs, ASR_RESULT)?,
            AsrResult::SCHEMA_VERSION,
        )?;

        let max_ms = ctx.config.utt_max_duration_ms;
        let min_ms = ctx.config.utt_min_duration_ms;

        // Merge same-speaker neighbors up to the window ceiling.
        let mut merged: Vec<Cue> = Vec::new();
        for utt in &asr.utterances {
            let extends_last = merged
                .last()
                .is_some_and(|last| {
                    last.speaker == utt.speaker && utt.end_ms - last.start_ms <= max_ms
                });
            if extends_last {
                if let Some(last) = merged.last_mut() {
                    last.end_ms = utt.end_ms;
                    last.text.push(' ');
                    last.text.push_str(&utt.text);
                }
            } else {
                merged.push(Cue {
                    cue_id: String::new(),
                    start_ms: utt.start_ms,
                    end_ms: utt.end_ms,
                    speaker: utt.speaker.clone(),
                    text: utt.text.clone(),
                });
            }
        }

        // Fold cues below the floor into their predecessor.
        let mut cues: Vec<Cue> = Vec::new();
        for cue in merged {
            let undersized = cue.end_ms - cue.start_ms < min_ms && !cues.is_empty();
            if undersized {
                if let Some(last) = cues.last_mut() {
                    last.end_ms = cue.end_ms;
                    last.text.push(' ');
                    last.text.push_str(&cue.text);
                }
            } else {
                cues.push(cue);
            }
        }
        for (i, cue) in cues.iter_mut().enumerate() {
            cue.cue_id = format!("cue_{:04}", i + 1);
        }

        let model = SubtitleModel {
            schema_version: SubtitleModel::SCHEMA_VERSION,
            duration_ms: asr.duration_ms,
            cues,
        };
        write_document(outputs.require(SUBTITLE_MODEL)?, &model)?;

        let srt_cues: Vec<SrtCue> = model
            .cues
            .iter()
            .map(|c| SrtCue {
                start_ms: c.start_ms,
                end_ms: c.end_ms,
                text: c.text.clone(),
            })
            .collect();
        write_text_atomic(outputs.require(SRC_SRT)?, &srt::render(&srt_cues))?;

        tracing::info!(
            cues = model.cues.len(),
            from_utterances = asr.utterances.len(),
            "segmented subtitles"
        );
        Ok(
            PhaseResult::succeeded(vec![SUBTITLE_MODEL.to_string(), SRC_SRT.to_string()])
                .with_metric("cues", model.cues.len() as u64),
        )
    }
}
