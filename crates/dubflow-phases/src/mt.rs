//! MT phase: translate CalDoc segments.
//!
//! Reads the calibration document and writes its own output file; the
//! CalDoc itself is owned by its producer and the external editor, so this
//! consumer never receives it as an output path.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_caldoc::CalDoc;
use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};

use crate::keys::{CALDOC, MT_OUTPUT};
use crate::model::{MtOutput, Translation, write_document};
use crate::processors::dict::DictTranslator;
use crate::support::input_path;

pub struct MtPhase;

impl Phase for MtPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let doc = CalDoc::load(&input_path(ctx, inputs, CALDOC)?)?;
        let translator = DictTranslator::load(
            ctx.config.mt_dict_path.as_deref(),
            &ctx.config.mt_target_lang,
        )?;

        let mut segments = Vec::with_capacity(doc.segments.len());
        let mut dict_hits = 0u64;
        for seg in &doc.segments {
            let (text_translated, hit) = translator.translate(&seg.text);
            if hit {
                dict_hits += 1;
            }
            segments.push(Translation {
                id: seg.id.clone(),
                text: seg.text.clone(),
                text_translated,
            });
        }

        let output = MtOutput {
            schema_version: MtOutput::SCHEMA_VERSION,
            model: ctx.config.mt_model.clone(),
            target_lang: ctx.config.mt_target_lang.clone(),
            segments,
        };
        write_document(outputs.require(MT_OUTPUT)?, &output)?;

        tracing::info!(
            segments = output.segments.len(),
            dict_hits,
            model = %output.model,
            "translated segments"
        );
        Ok(PhaseResult::succeeded(vec![MT_OUTPUT.to_string()])
            .with_metric("segments", output.segments.len() as u64)
            .with_metric("dict_hits", dict_hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::read_document;
    use camino::Utf8PathBuf;
    use dubflow_caldoc::{Segment, SegmentFlags};
    use dubflow_config::PipelineConfig;
    use dubflow_manifest::{ArtifactKind, Producer};

    fn fixture(
        texts: &[&str],
    ) -> (tempfile::TempDir, RunContext, BTreeMap<String, Artifact>, ResolvedOutputs) {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let mut doc = CalDoc::new(10_000, "fp");
        for (i, text) in texts.iter().enumerate() {
            doc.segments.push(Segment {
                id: format!("seg_{i:08}"),
                start_ms: i as u64 * 1000,
                end_ms: (i as u64 + 1) * 1000,
                text: text.to_string(),
                text_translated: String::new(),
                speaker: "spk_0".to_string(),
                emotion: "neutral".to_string(),
                segment_type: "speech".to_string(),
                tts_policy: None,
                flags: SegmentFlags::default(),
            });
        }
        doc.save(&ws.join("state/caldoc.json")).unwrap();

        let ctx = RunContext {
            job_id: "job".to_string(),
            workspace: ws.clone(),
            video_path: ws.join("v.mp4"),
            config: PipelineConfig::default(),
        };
        let mut inputs = BTreeMap::new();
        inputs.insert(
            CALDOC.to_string(),
            Artifact {
                key: CALDOC.to_string(),
                relpath: Utf8PathBuf::from("state/caldoc.json"),
                kind: ArtifactKind::Json,
                fingerprint: "f".repeat(64),
                producer: Producer {
                    name: "reseg".to_string(),
                    version: "1.0.0".to_string(),
                },
                meta: BTreeMap::new(),
            },
        );
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(MT_OUTPUT, ws.join("mt/mt_output.json"));
        (dir, ctx, inputs, outputs)
    }

    #[test]
    fn every_segment_gets_a_translation() {
        let (_dir, ctx, inputs, outputs) = fixture(&["first line", "second line"]);

        MtPhase.run(&ctx, &inputs, &outputs).unwrap();

        let output: MtOutput =
            read_document(outputs.require(MT_OUTPUT).unwrap(), MtOutput::SCHEMA_VERSION).unwrap();
        assert_eq!(output.segments.len(), 2);
        assert_eq!(output.segments[0].id, "seg_00000000");
        assert_eq!(output.segments[0].text_translated, "[en] first line");
    }

    #[test]
    fn caldoc_file_is_left_untouched() {
        let (_dir, ctx, inputs, outputs) = fixture(&["a line"]);
        let caldoc_path = ctx.workspace.join("state/caldoc.json");
        let before = std::fs::read(caldoc_path.as_std_path()).unwrap();

        MtPhase.run(&ctx, &inputs, &outputs).unwrap();

        assert_eq!(std::fs::read(caldoc_path.as_std_path()).unwrap(), before);
    }
}
