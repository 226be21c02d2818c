//! Reseg phase: build the CalDoc from the subtitle model.
//!
//! This is the producer of the human-edited document, so it is the one
//! phase with a guard against clobbering: when the document already exists
//! and its recorded upstream fingerprint matches the current subtitle
//! model, the existing file is re-emitted untouched; a forced run never
//! discards human edits. A changed upstream regenerates wholesale.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_caldoc::{CalDoc, Segment, SegmentFlags, gen_segment_id};
use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};

use crate::keys::{CALDOC, SUBTITLE_MODEL};
use crate::model::{Cue, SubtitleModel, read_document};
use crate::support::input_path;

pub struct ResegPhase;

impl Phase for ResegPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let upstream = inputs
            .get(SUBTITLE_MODEL)
            .ok_or_else(|| anyhow::anyhow!("Input artifact not resolved: {SUBTITLE_MODEL}"))?;
        let caldoc_path = outputs.require(CALDOC)?;

        if caldoc_path.as_std_path().exists() {
            let existing = CalDoc::load(caldoc_path)?;
            if existing.history.source_fingerprint == upstream.fingerprint {
                tracing::info!(rev = existing.history.rev, "calibration document is current, keeping edits");
                return Ok(PhaseResult::succeeded(vec![CALDOC.to_string()])
                    .with_metric("segments", existing.segments.len() as u64)
                    .with_metric("reused", true));
            }
            tracing::warn!("upstream subtitles changed, regenerating calibration document");
        }

        let model: SubtitleModel = read_document(
            &input_path(ctx, inputs, SUBTITLE_MODEL)?,
            SubtitleModel::SCHEMA_VERSION,
        )?;

        let mut doc = CalDoc::new(model.duration_ms, &upstream.fingerprint);
        let mut split_count = 0u64;
        for cue in &model.cues {
            let pieces = split_cue(cue, &ctx.config);
            if pieces.len() > 1 {
                split_count += 1;
            }
            doc.segments.extend(pieces);
        }
        doc.save(caldoc_path)?;

        tracing::info!(
            segments = doc.segments.len(),
            splits = split_count,
            "built calibration document"
        );
        Ok(PhaseResult::succeeded(vec![CALDOC.to_string()])
            .with_metric("segments", doc.segments.len() as u64)
            .with_metric("splits", split_count))
    }
}

/// Split one cue into segments per the reseg triggers.
///
/// A cue splits in half when its text or duration exceeds the configured
/// triggers, unless a half would fall below the minimum character count.
fn split_cue(cue: &Cue, config: &dubflow_config::PipelineConfig) -> Vec<Segment> {
    let chars: Vec<char> = cue.text.chars().collect();
    let duration = cue.end_ms.saturating_sub(cue.start_ms);

    let over_chars = chars.len() > config.reseg_max_chars_trigger;
    let over_duration = duration > config.reseg_max_duration_trigger_ms;
    let splittable = chars.len() / 2 >= config.reseg_min_chars;

    if config.reseg_enabled && (over_chars || over_duration) && splittable {
        let mid_char = chars.len() / 2;
        let mid_ms = cue.start_ms + duration / 2;
        let first: String = chars[..mid_char].iter().collect();
        let second: String = chars[mid_char..].iter().collect();
        vec![
            segment(cue, cue.start_ms, mid_ms, first.trim().to_string()),
            segment(cue, mid_ms, cue.end_ms, second.trim().to_string()),
        ]
    } else {
        vec![segment(cue, cue.start_ms, cue.end_ms, cue.text.clone())]
    }
}

fn segment(cue: &Cue, start_ms: u64, end_ms: u64, text: String) -> Segment {
    Segment {
        id: gen_segment_id(),
        start_ms,
        end_ms,
        text,
        text_translated: String::new(),
        speaker: cue.speaker.clone(),
        emotion: "neutral".to_string(),
        segment_type: "speech".to_string(),
        tts_policy: None,
        flags: SegmentFlags::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::write_document;
    use camino::Utf8PathBuf;
    use dubflow_config::PipelineConfig;
    use dubflow_manifest::{ArtifactKind, Producer};

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: RunContext,
        inputs: BTreeMap<String, Artifact>,
        outputs: ResolvedOutputs,
    }

    fn fixture(cues: Vec<Cue>, upstream_fp: &str) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let duration_ms = cues.last().map(|c| c.end_ms).unwrap_or(0);
        write_document(
            &ws.join("subs/subtitle_model.json"),
            &SubtitleModel {
                schema_version: SubtitleModel::SCHEMA_VERSION,
                duration_ms,
                cues,
            },
        )
        .unwrap();

        let ctx = RunContext {
            job_id: "job".to_string(),
            workspace: ws.clone(),
            video_path: ws.join("v.mp4"),
            config: PipelineConfig::default(),
        };
        let mut inputs = BTreeMap::new();
        inputs.insert(
            SUBTITLE_MODEL.to_string(),
            Artifact {
                key: SUBTITLE_MODEL.to_string(),
                relpath: Utf8PathBuf::from("subs/subtitle_model.json"),
                kind: ArtifactKind::Json,
                fingerprint: upstream_fp.to_string(),
                producer: Producer {
                    name: "parse".to_string(),
                    version: "1.0.0".to_string(),
                },
                meta: BTreeMap::new(),
            },
        );
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(CALDOC, ws.join("state/caldoc.json"));
        Fixture {
            _dir: dir,
            ctx,
            inputs,
            outputs,
        }
    }

    fn cue(start_ms: u64, end_ms: u64, text: &str) -> Cue {
        Cue {
            cue_id: "cue_0001".to_string(),
            start_ms,
            end_ms,
            speaker: "spk_0".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn builds_document_with_rev_one() {
        let f = fixture(vec![cue(0, 1500, "short line")], "fp-a");

        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let doc = CalDoc::load(f.outputs.require(CALDOC).unwrap()).unwrap();
        assert_eq!(doc.history.rev, 1);
        assert_eq!(doc.segments.len(), 1);
        assert_eq!(doc.history.source_fingerprint, "fp-a");
        assert!(doc.segments[0].id.starts_with("seg_"));
    }

    #[test]
    fn long_cue_splits_in_half() {
        let long_text = "this cue has well over twenty five characters in it";
        let f = fixture(vec![cue(0, 8_000, long_text)], "fp-a");

        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let doc = CalDoc::load(f.outputs.require(CALDOC).unwrap()).unwrap();
        assert_eq!(doc.segments.len(), 2);
        assert_eq!(doc.segments[0].end_ms, 4_000);
        assert_eq!(doc.segments[1].start_ms, 4_000);
    }

    #[test]
    fn unchanged_upstream_keeps_human_edits() {
        let f = fixture(vec![cue(0, 1500, "short line")], "fp-a");
        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        // Simulate a human edit through the editor.
        let path = f.outputs.require(CALDOC).unwrap();
        let mut doc = CalDoc::load(path).unwrap();
        doc.segments[0].text = "edited by hand".to_string();
        doc.save(path).unwrap();
        let edited_rev = doc.history.rev;

        // Forced re-run with the same upstream fingerprint.
        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let kept = CalDoc::load(path).unwrap();
        assert_eq!(kept.segments[0].text, "edited by hand");
        assert_eq!(kept.history.rev, edited_rev);
    }

    #[test]
    fn changed_upstream_regenerates_wholesale() {
        let mut f = fixture(vec![cue(0, 1500, "short line")], "fp-a");
        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let path = f.outputs.require(CALDOC).unwrap().to_path_buf();
        let mut doc = CalDoc::load(&path).unwrap();
        doc.segments[0].text = "edited by hand".to_string();
        doc.save(&path).unwrap();

        // Upstream subtitles changed: stale edits are discarded.
        f.inputs.get_mut(SUBTITLE_MODEL).unwrap().fingerprint = "fp-b".to_string();
        ResegPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let regenerated = CalDoc::load(&path).unwrap();
        assert_eq!(regenerated.segments[0].text, "short line");
        assert_eq!(regenerated.history.rev, 1);
        assert_eq!(regenerated.history.source_fingerprint, "fp-b");
    }
}
