//! ASR phase: speech recognition over the extracted track.
//!
//! The stand-in transcriber slices the track into fixed windows with
//! placeholder text and alternating speakers, so the downstream pipeline
//! stays exercisable without recognition credentials.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};

use crate::keys::{ASR_RESULT, EXTRACT_AUDIO};
use crate::model::{AsrResult, Utterance, write_document};
use crate::processors::wav;
use crate::support::input_path;

const WINDOW_MS: u64 = 1_800;

pub struct AsrPhase;

impl Phase for AsrPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let audio = input_path(ctx, inputs, EXTRACT_AUDIO)?;
        let duration_ms = wav::duration_ms(&audio)?;

        let mut utterances = Vec::new();
        let mut start = 0u64;
        while start < duration_ms {
            let end = (start + WINDOW_MS).min(duration_ms);
            let index = utterances.len();
            utterances.push(Utterance {
                start_ms: start,
                end_ms: end,
                text: format!("Source line {:02}.", index + 1),
                speaker: format!("spk_{}", index % 2),
            });
            start = end;
        }

        let result = AsrResult {
            schema_version: AsrResult::SCHEMA_VERSION,
            duration_ms,
            preset: ctx.config.asr_preset.clone(),
            utterances,
        };
        write_document(outputs.require(ASR_RESULT)?, &result)?;

        tracing::info!(
            utterances = result.utterances.len(),
            preset = %result.preset,
            "transcribed track"
        );
        Ok(PhaseResult::succeeded(vec![ASR_RESULT.to_string()])
            .with_metric("utterances", result.utterances.len() as u64)
            .with_metric("hotwords", ctx.config.asr_hotwords.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::read_document;
    use camino::Utf8PathBuf;
    use dubflow_config::PipelineConfig;
    use dubflow_manifest::{ArtifactKind, Producer};

    fn fixture(duration_ms: u64) -> (tempfile::TempDir, RunContext, BTreeMap<String, Artifact>, ResolvedOutputs)
    {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        wav::write_wav(&ws.join("audio/audio_raw.wav"), &wav::silence(duration_ms)).unwrap();

        let ctx = RunContext {
            job_id: "job".to_string(),
            workspace: ws.clone(),
            video_path: ws.join("v.mp4"),
            config: PipelineConfig::default(),
        };
        let mut inputs = BTreeMap::new();
        inputs.insert(
            EXTRACT_AUDIO.to_string(),
            Artifact {
                key: EXTRACT_AUDIO.to_string(),
                relpath: Utf8PathBuf::from("audio/audio_raw.wav"),
                kind: ArtifactKind::Wav,
                fingerprint: "f".repeat(64),
                producer: Producer {
                    name: "extract".to_string(),
                    version: "1.0.0".to_string(),
                },
                meta: BTreeMap::new(),
            },
        );
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(ASR_RESULT, ws.join("source/asr-result.json"));
        (dir, ctx, inputs, outputs)
    }

    #[test]
    fn windows_cover_the_whole_track() {
        let (_dir, ctx, inputs, outputs) = fixture(4_500);

        AsrPhase.run(&ctx, &inputs, &outputs).unwrap();

        let result: AsrResult =
            read_document(outputs.require(ASR_RESULT).unwrap(), AsrResult::SCHEMA_VERSION).unwrap();
        assert_eq!(result.utterances.len(), 3);
        assert_eq!(result.utterances[0].end_ms, 1_800);
        assert_eq!(result.utterances[2].end_ms, 4_500);
        assert_eq!(result.utterances[0].speaker, "spk_0");
        assert_eq!(result.utterances[1].speaker, "spk_1");
    }

    #[test]
    fn result_is_deterministic() {
        let (_dir, ctx, inputs, outputs) = fixture(6_000);
        AsrPhase.run(&ctx, &inputs, &outputs).unwrap();
        let first = std::fs::read(outputs.require(ASR_RESULT).unwrap().as_std_path()).unwrap();
        AsrPhase.run(&ctx, &inputs, &outputs).unwrap();
        let second = std::fs::read(outputs.require(ASR_RESULT).unwrap().as_std_path()).unwrap();
        assert_eq!(first, second);
    }
}
