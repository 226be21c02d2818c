//! TTS phase: synthesize one audio clip per dub segment.
//!
//! The spoken text comes from the target SRT, the reviewable rendering,
//! so a blessed subtitle edit re-synthesizes exactly the lines it changed.
//! Synthesis fans out over a bounded worker pool; all workers are joined
//! before the phase returns, and each clip goes to its own file under the
//! allocated segments directory.

use anyhow::Result;
use camino::Utf8Path;
use std::collections::BTreeMap;
use std::sync::Mutex;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};

use crate::keys::{DUB_MANIFEST, EN_SRT, TTS_REPORT, TTS_SEGMENTS_DIR};
use crate::model::{DubManifest, DubSegment, SynthesizedSegment, TtsReport, read_document, write_document};
use crate::processors::srt;
use crate::processors::wav;
use crate::support::input_path;

pub struct TtsPhase;

impl Phase for TtsPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let manifest: DubManifest = read_document(
            &input_path(ctx, inputs, DUB_MANIFEST)?,
            DubManifest::SCHEMA_VERSION,
        )?;
        let srt_text =
            std::fs::read_to_string(input_path(ctx, inputs, EN_SRT)?.as_std_path())?;
        let cues = srt::parse(&srt_text)?;

        let mut warnings = Vec::new();
        if cues.len() != manifest.segments.len() {
            warnings.push(format!(
                "subtitle cue count ({}) differs from dub manifest ({}), falling back to manifest text",
                cues.len(),
                manifest.segments.len()
            ));
        }

        // Spoken lines: the SRT text when it lines up, the manifest otherwise.
        let lines: Vec<String> = manifest
            .segments
            .iter()
            .enumerate()
            .map(|(i, seg)| {
                if cues.len() == manifest.segments.len() {
                    cues[i].text.clone()
                } else {
                    seg.text.clone()
                }
            })
            .collect();

        let segments_dir = outputs.require(TTS_SEGMENTS_DIR)?;
        if segments_dir.as_std_path().exists() {
            std::fs::remove_dir_all(segments_dir.as_std_path())?;
        }
        std::fs::create_dir_all(segments_dir.as_std_path())?;

        let workers = ctx.config.tts_max_workers.max(1);
        let jobs: Vec<(usize, &DubSegment, &str)> = manifest
            .segments
            .iter()
            .enumerate()
            .map(|(i, seg)| (i, seg, lines[i].as_str()))
            .collect();
        let results: Mutex<Vec<Option<SynthesizedSegment>>> =
            Mutex::new(vec![None; manifest.segments.len()]);
        let errors: Mutex<Vec<String>> = Mutex::new(Vec::new());

        let results_ref = &results;
        let errors_ref = &errors;
        std::thread::scope(|scope| {
            for chunk in jobs.chunks(jobs.len().div_ceil(workers).max(1)) {
                scope.spawn(move || {
                    for (index, seg, text) in chunk {
                        match synthesize(ctx, segments_dir, seg, text) {
                            Ok(done) => {
                                if let Ok(mut slot) = results_ref.lock() {
                                    slot[*index] = Some(done);
                                }
                            }
                            Err(e) => {
                                if let Ok(mut errs) = errors_ref.lock() {
                                    errs.push(format!("{}: {e:#}", seg.id));
                                }
                            }
                        }
                    }
                });
            }
        });

        let errors = errors.into_inner().unwrap_or_default();
        if let Some(first) = errors.first() {
            return Ok(PhaseResult::failed(
                "SynthesisError",
                format!("{} segment(s) failed, first: {first}", errors.len()),
            ));
        }

        let segments: Vec<SynthesizedSegment> = results
            .into_inner()
            .unwrap_or_default()
            .into_iter()
            .flatten()
            .collect();
        let report = TtsReport {
            schema_version: TtsReport::SCHEMA_VERSION,
            engine: ctx.config.tts_engine.clone(),
            segments,
        };
        write_document(outputs.require(TTS_REPORT)?, &report)?;

        tracing::info!(
            synthesized = report.segments.len(),
            workers,
            engine = %report.engine,
            "synthesized dub segments"
        );
        let mut result = PhaseResult::succeeded(vec![
            TTS_SEGMENTS_DIR.to_string(),
            TTS_REPORT.to_string(),
        ])
        .with_metric("synthesized", report.segments.len() as u64)
        .with_metric("workers", workers as u64);
        result.warnings = warnings;
        Ok(result)
    }
}

/// Render one segment to `<segments_dir>/<id>.wav`.
///
/// The clip length is the slot compressed by the playback rate; the signal
/// is seeded from everything that should change it: engine, voice, rate,
/// volume, and the spoken text.
fn synthesize(
    ctx: &RunContext,
    segments_dir: &Utf8Path,
    seg: &DubSegment,
    text: &str,
) -> Result<SynthesizedSegment> {
    let slot_ms = seg.end_ms.saturating_sub(seg.start_ms).max(1);
    let duration_ms = ((slot_ms as f64 / seg.rate).round() as u64).max(1);
    let seed = format!(
        "{}|{}|{:.2}|{:.2}|{}",
        ctx.config.tts_engine, seg.voice, seg.rate, ctx.config.tts_volume, text
    );
    let file = format!("{}.wav", seg.id);
    wav::write_wav(&segments_dir.join(&file), &wav::seeded_pcm(&seed, duration_ms))?;
    Ok(SynthesizedSegment {
        id: seg.id.clone(),
        file,
        duration_ms,
        voice: seg.voice.clone(),
        rate: seg.rate,
    })
}
