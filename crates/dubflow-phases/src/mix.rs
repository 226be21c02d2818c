//! Mix phase: lay the synthesized clips onto the program bed.
//!
//! The bed is the extracted original track (or silence when the original is
//! muted) and each clip is placed at its segment's start offset. Loudness
//! targets are a provider concern; here they only feed the input
//! fingerprint, so retuning them still remixes.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};

use crate::keys::{DUB_MANIFEST, EXTRACT_AUDIO, MIX_AUDIO, TTS_REPORT, TTS_SEGMENTS_DIR};
use crate::model::{DubManifest, TtsReport, read_document};
use crate::processors::wav;
use crate::support::input_path;

pub struct MixPhase;

impl Phase for MixPhase {
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
        let report: TtsReport = read_document(
            &input_path(ctx, inputs, TTS_REPORT)?,
            TtsReport::SCHEMA_VERSION,
        )?;
        let segments_dir = input_path(ctx, inputs, TTS_SEGMENTS_DIR)?;

        let mut bed = if ctx.config.tts_mute_original {
            wav::silence(manifest.duration_ms)
        } else {
            wav::read_pcm(&input_path(ctx, inputs, EXTRACT_AUDIO)?)?
        };

        let starts: BTreeMap<&str, u64> = manifest
            .segments
            .iter()
            .map(|s| (s.id.as_str(), s.start_ms))
            .collect();

        let mut mixed = 0u64;
        for synthesized in &report.segments {
            let Some(&start_ms) = starts.get(synthesized.id.as_str()) else {
                continue;
            };
            let clip = wav::read_pcm(&segments_dir.join(&synthesized.file))?;
            let offset = (start_ms * wav::BYTES_PER_MS) as usize;
            if offset >= bed.len() {
                continue;
            }
            let len = clip.len().min(bed.len() - offset);
            bed[offset..offset + len].copy_from_slice(&clip[..len]);
            mixed += 1;
        }

        wav::write_wav(outputs.require(MIX_AUDIO)?, &bed)?;

        let duration_ms = bed.len() as u64 / wav::BYTES_PER_MS;
        tracing::info!(segments_mixed = mixed, duration_ms, "mixed dub track");
        Ok(PhaseResult::succeeded(vec![MIX_AUDIO.to_string()])
            .with_metric("segments_mixed", mixed)
            .with_metric("duration_ms", duration_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DubSegment, SynthesizedSegment, write_document};
    use camino::Utf8PathBuf;
    use dubflow_config::PipelineConfig;
    use dubflow_manifest::{ArtifactKind, Producer};

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: RunContext,
        inputs: BTreeMap<String, Artifact>,
        outputs: ResolvedOutputs,
    }

    fn artifact(key: &str, relpath: &str) -> Artifact {
        Artifact {
            key: key.to_string(),
            relpath: Utf8PathBuf::from(relpath),
            kind: ArtifactKind::Json,
            fingerprint: "f".repeat(64),
            producer: Producer {
                name: "tts".to_string(),
                version: "1.1.0".to_string(),
            },
            meta: BTreeMap::new(),
        }
    }

    fn fixture(duration_ms: u64, clips: &[(&str, u64, u64)]) -> Fixture {
        let dir = tempfile::TempDir::new().unwrap();
        let ws = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        wav::write_wav(&ws.join("audio/audio_raw.wav"), &wav::silence(duration_ms)).unwrap();

        let segments: Vec<DubSegment> = clips
            .iter()
            .map(|(id, start_ms, end_ms)| DubSegment {
                id: id.to_string(),
                start_ms: *start_ms,
                end_ms: *end_ms,
                text: "line".to_string(),
                voice: "en_male_1".to_string(),
                rate: 1.0,
            })
            .collect();
        write_document(
            &ws.join("dub/dub_manifest.json"),
            &DubManifest {
                schema_version: DubManifest::SCHEMA_VERSION,
                duration_ms,
                segments,
            },
        )
        .unwrap();

        let mut synthesized = Vec::new();
        for (id, start_ms, end_ms) in clips {
            let file = format!("{id}.wav");
            let clip_ms = end_ms - start_ms;
            wav::write_wav(
                &ws.join("tts/segments").join(&file),
                &wav::seeded_pcm(id, clip_ms),
            )
            .unwrap();
            synthesized.push(SynthesizedSegment {
                id: id.to_string(),
                file,
                duration_ms: clip_ms,
                voice: "en_male_1".to_string(),
                rate: 1.0,
            });
        }
        write_document(
            &ws.join("tts/report.json"),
            &TtsReport {
                schema_version: TtsReport::SCHEMA_VERSION,
                engine: "volcengine".to_string(),
                segments: synthesized,
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
            DUB_MANIFEST.to_string(),
            artifact(DUB_MANIFEST, "dub/dub_manifest.json"),
        );
        inputs.insert(
            TTS_SEGMENTS_DIR.to_string(),
            artifact(TTS_SEGMENTS_DIR, "tts/segments"),
        );
        inputs.insert(TTS_REPORT.to_string(), artifact(TTS_REPORT, "tts/report.json"));
        inputs.insert(
            EXTRACT_AUDIO.to_string(),
            artifact(EXTRACT_AUDIO, "audio/audio_raw.wav"),
        );
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(MIX_AUDIO, ws.join("mix/dub_audio.wav"));
        Fixture {
            _dir: dir,
            ctx,
            inputs,
            outputs,
        }
    }

    #[test]
    fn output_spans_the_program_and_carries_clips() {
        let f = fixture(8_000, &[("seg_a", 1_000, 2_000)]);

        MixPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let out = f.outputs.require(MIX_AUDIO).unwrap();
        assert_eq!(wav::duration_ms(out).unwrap(), 8_000);

        let pcm = wav::read_pcm(out).unwrap();
        let offset = (1_000 * wav::BYTES_PER_MS) as usize;
        let clip = wav::seeded_pcm("seg_a", 1_000);
        assert_eq!(&pcm[offset..offset + clip.len()], &clip[..]);
        // Before the clip the bed is untouched silence.
        assert!(pcm[..offset].iter().all(|&b| b == 0));
    }

    #[test]
    fn clip_running_past_the_end_is_clipped() {
        let f = fixture(2_000, &[("seg_a", 1_500, 3_500)]);

        let result = MixPhase.run(&f.ctx, &f.inputs, &f.outputs).unwrap();

        let out = f.outputs.require(MIX_AUDIO).unwrap();
        assert_eq!(wav::duration_ms(out).unwrap(), 2_000);
        assert_eq!(result.metrics["segments_mixed"], serde_json::json!(1));
    }
}
