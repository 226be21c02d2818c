//! Align phase: merge CalDoc timing with translations into the dub plan.
//!
//! Produces the target-language SRT and the dub manifest: per-segment
//! voice assignment and a playback-rate policy chosen so each rendered
//! line fits its slot. A human translation in the CalDoc wins over the MT
//! output for the same segment.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_caldoc::CalDoc;
use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};
use dubflow_utils::atomic_write::write_text_atomic;

use crate::keys::{CALDOC, DUB_MANIFEST, EN_SRT, EXTRACT_AUDIO, MT_OUTPUT};
use crate::model::{DubManifest, DubSegment, MtOutput, read_document, write_document};
use crate::processors::srt::{self, SrtCue};
use crate::processors::voices;
use crate::processors::wav;
use crate::support::input_path;

/// Rough speaking pace of the synthesizer, used to estimate rendered length.
const MS_PER_CHAR: u64 = 60;

const MIN_RATE: f64 = 0.75;
const MAX_RATE: f64 = 1.4;

pub struct AlignPhase;

impl Phase for AlignPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let doc = CalDoc::load(&input_path(ctx, inputs, CALDOC)?)?;
        let mt: MtOutput = read_document(
            &input_path(ctx, inputs, MT_OUTPUT)?,
            MtOutput::SCHEMA_VERSION,
        )?;
        let duration_ms = wav::duration_ms(&input_path(ctx, inputs, EXTRACT_AUDIO)?)?;

        let translations: BTreeMap<&str, &str> = mt
            .segments
            .iter()
            .map(|t| (t.id.as_str(), t.text_translated.as_str()))
            .collect();
        let voice_map = voices::assign(doc.segments.iter().map(|s| s.speaker.clone()));

        let mut segments = Vec::with_capacity(doc.segments.len());
        let mut rate_sum = 0.0;
        for seg in &doc.segments {
            // Human translation in the CalDoc takes precedence.
            let text = if seg.text_translated.is_empty() {
                translations.get(seg.id.as_str()).copied().unwrap_or("")
            } else {
                seg.text_translated.as_str()
            };
            let slot_ms = seg.end_ms.saturating_sub(seg.start_ms).max(1);
            let estimated_ms = text.chars().count() as u64 * MS_PER_CHAR;
            let rate = (estimated_ms as f64 / slot_ms as f64).clamp(MIN_RATE, MAX_RATE);
            let rate = (rate * 100.0).round() / 100.0;
            rate_sum += rate;

            segments.push(DubSegment {
                id: seg.id.clone(),
                start_ms: seg.start_ms,
                end_ms: seg.end_ms,
                text: text.to_string(),
                voice: voice_map
                    .get(&seg.speaker)
                    .cloned()
                    .unwrap_or_else(|| voices::VOICE_POOL[0].to_string()),
                rate,
            });
        }

        let srt_cues: Vec<SrtCue> = segments
            .iter()
            .map(|s| SrtCue {
                start_ms: s.start_ms,
                end_ms: s.end_ms,
                text: s.text.clone(),
            })
            .collect();
        write_text_atomic(outputs.require(EN_SRT)?, &srt::render(&srt_cues))?;

        let manifest = DubManifest {
            schema_version: DubManifest::SCHEMA_VERSION,
            duration_ms,
            segments,
        };
        write_document(outputs.require(DUB_MANIFEST)?, &manifest)?;

        let avg_rate = if manifest.segments.is_empty() {
            1.0
        } else {
            rate_sum / manifest.segments.len() as f64
        };
        tracing::info!(segments = manifest.segments.len(), avg_rate, "aligned dub plan");
        Ok(
            PhaseResult::succeeded(vec![EN_SRT.to_string(), DUB_MANIFEST.to_string()])
                .with_metric("segments", manifest.segments.len() as u64)
                .with_metric("avg_rate", (avg_rate * 100.0).round() / 100.0),
        )
    }
}
