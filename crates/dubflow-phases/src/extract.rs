//! Extract phase: pull the audio track out of the source video.
//!
//! The stand-in decoder derives a deterministic PCM track from the source
//! bytes; a provider-backed build would shell out to a real demuxer here.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};
use dubflow_utils::fingerprint::hash_file;

use crate::keys::EXTRACT_AUDIO;
use crate::processors::wav;

pub struct ExtractPhase;

impl Phase for ExtractPhase {
    fn run(
        &self,
        ctx: &RunContext,
        _inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let video = &ctx.video_path;
        if !video.as_std_path().exists() {
            return Ok(PhaseResult::failed(
                "FileNotFoundError",
                format!("Video file not found: {video}"),
            ));
        }
        let size = std::fs::metadata(video.as_std_path())?.len();
        if size == 0 {
            return Ok(PhaseResult::failed(
                "EmptyInput",
                format!("Video file is empty: {video}"),
            ));
        }

        let source_fp = hash_file(video)?;
        // Track length follows the source content so different inputs get
        // different (but repeatable) timelines.
        let lead = u64::from_str_radix(&source_fp[..2], 16).unwrap_or(0);
        let duration_ms = 6_000 + (lead % 16) * 1_500;

        let pcm = wav::seeded_pcm(&source_fp, duration_ms);
        wav::write_wav(outputs.require(EXTRACT_AUDIO)?, &pcm)?;

        tracing::info!(duration_ms, source_bytes = size, "extracted audio track");
        Ok(PhaseResult::succeeded(vec![EXTRACT_AUDIO.to_string()])
            .with_metric("duration_ms", duration_ms)
            .with_metric("source_bytes", size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use dubflow_config::PipelineConfig;
    use dubflow_phase_api::PhaseOutcome;
    use tempfile::TempDir;

    fn context(dir: &TempDir, video_name: &str) -> (RunContext, ResolvedOutputs) {
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let ctx = RunContext {
            job_id: "job".to_string(),
            workspace: root.join("ws"),
            video_path: root.join(video_name),
            config: PipelineConfig::default(),
        };
        let mut outputs = ResolvedOutputs::default();
        outputs.insert(EXTRACT_AUDIO, ctx.workspace.join("audio/audio_raw.wav"));
        (ctx, outputs)
    }

    #[test]
    fn missing_video_fails_without_writing() {
        let dir = TempDir::new().unwrap();
        let (ctx, outputs) = context(&dir, "absent.mp4");

        let result = ExtractPhase.run(&ctx, &BTreeMap::new(), &outputs).unwrap();

        assert_eq!(result.status, PhaseOutcome::Failed);
        assert!(!outputs.require(EXTRACT_AUDIO).unwrap().as_std_path().exists());
    }

    #[test]
    fn same_video_always_extracts_identical_audio() {
        let dir = TempDir::new().unwrap();
        let (ctx, outputs) = context(&dir, "v.mp4");
        std::fs::write(ctx.video_path.as_std_path(), b"some video bytes").unwrap();

        ExtractPhase.run(&ctx, &BTreeMap::new(), &outputs).unwrap();
        let first = std::fs::read(outputs.require(EXTRACT_AUDIO).unwrap().as_std_path()).unwrap();

        ExtractPhase.run(&ctx, &BTreeMap::new(), &outputs).unwrap();
        let second = std::fs::read(outputs.require(EXTRACT_AUDIO).unwrap().as_std_path()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn different_video_content_changes_the_track() {
        let dir = TempDir::new().unwrap();
        let (ctx, outputs) = context(&dir, "v.mp4");

        std::fs::write(ctx.video_path.as_std_path(), b"take one").unwrap();
        ExtractPhase.run(&ctx, &BTreeMap::new(), &outputs).unwrap();
        let first = std::fs::read(outputs.require(EXTRACT_AUDIO).unwrap().as_std_path()).unwrap();

        std::fs::write(ctx.video_path.as_std_path(), b"take two").unwrap();
        ExtractPhase.run(&ctx, &BTreeMap::new(), &outputs).unwrap();
        let second = std::fs::read(outputs.require(EXTRACT_AUDIO).unwrap().as_std_path()).unwrap();

        assert_ne!(first, second);
    }
}
