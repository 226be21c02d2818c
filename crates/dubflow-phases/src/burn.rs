//! Burn phase: mux the dubbed track and subtitles into the output file.
//!
//! The stand-in muxer writes the source container followed by a trailer
//! naming the dub track and subtitle content by fingerprint; a real build
//! would hand these paths to an encoder. The output is still a pure
//! function of all three inputs.

use anyhow::Result;
use std::collections::BTreeMap;

use dubflow_manifest::Artifact;
use dubflow_phase_api::{Phase, PhaseResult, ResolvedOutputs, RunContext};
use dubflow_utils::atomic_write::write_bytes_atomic;
use dubflow_utils::fingerprint::hash_file;

use crate::keys::{BURN_VIDEO, EN_SRT, MIX_AUDIO};
use crate::support::input_path;

const TRAILER_MAGIC: &[u8] = b"\n--dubflow-mux--\n";

pub struct BurnPhase;

impl Phase for BurnPhase {
    fn run(
        &self,
        ctx: &RunContext,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> Result<PhaseResult> {
        let video = &ctx.video_path;
        if !video.as_std_path().exists() {
            return Ok(PhaseResult::failed(
                "FileNotFoundError",
                format!("Video file not found: {video}"),
            ));
        }

        let audio_fp = hash_file(&input_path(ctx, inputs, MIX_AUDIO)?)?;
        let subs_fp = hash_file(&input_path(ctx, inputs, EN_SRT)?)?;

        let mut bytes = std::fs::read(video.as_std_path())?;
        bytes.extend_from_slice(TRAILER_MAGIC);
        bytes.extend_from_slice(format!("audio {audio_fp}\nsubs {subs_fp}\n").as_bytes());
        write_bytes_atomic(outputs.require(BURN_VIDEO)?, &bytes)?;

        tracing::info!(output_bytes = bytes.len(), "muxed dubbed video");
        Ok(PhaseResult::succeeded(vec![BURN_VIDEO.to_string()])
            .with_metric("output_bytes", bytes.len() as u64))
    }
}
