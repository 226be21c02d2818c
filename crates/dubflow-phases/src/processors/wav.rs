//! Minimal PCM WAV reading and writing.
//!
//! Everything in the pipeline speaks 16 kHz mono signed 16-bit PCM, which
//! keeps the byte/millisecond arithmetic exact: 32 bytes per millisecond.

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use sha2::{Digest, Sha256};

use dubflow_utils::atomic_write::write_bytes_atomic;

pub const SAMPLE_RATE: u32 = 16_000;
/// 16-bit mono at 16 kHz.
pub const BYTES_PER_MS: u64 = 32;

const HEADER_LEN: usize = 44;

/// PCM buffer of silence for `duration_ms`.
pub fn silence(duration_ms: u64) -> Vec<u8> {
    vec![0u8; (duration_ms * BYTES_PER_MS) as usize]
}

/// Deterministic pseudo-waveform: the SHA-256 of `seed` tiled across the
/// buffer. Two seeds produce two different signals, one seed always the
/// same, which is exactly what content addressing needs from a stand-in
/// synthesizer.
pub fn seeded_pcm(seed: &str, duration_ms: u64) -> Vec<u8> {
    let digest = Sha256::digest(seed.as_bytes());
    let len = (duration_ms * BYTES_PER_MS) as usize;
    digest.iter().copied().cycle().take(len).collect()
}

/// Write a PCM buffer as a RIFF/WAVE file, atomically.
pub fn write_wav(path: &Utf8Path, pcm: &[u8]) -> Result<()> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + pcm.len());
    let data_len = pcm.len() as u32;
    let byte_rate = SAMPLE_RATE * 2;

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.extend_from_slice(pcm);

    write_bytes_atomic(path, &bytes)
}

/// Read the PCM payload of a WAV file written by [`write_wav`].
pub fn read_pcm(path: &Utf8Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path.as_std_path()).with_context(|| format!("Failed to read WAV: {path}"))?;
    if bytes.len() < HEADER_LEN || &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        bail!("Not a RIFF/WAVE file: {path}");
    }
    Ok(bytes[HEADER_LEN..].to_vec())
}

/// Duration of a WAV file in milliseconds.
pub fn duration_ms(path: &Utf8Path) -> Result<u64> {
    let pcm = read_pcm(path)?;
    Ok(pcm.len() as u64 / BYTES_PER_MS)
}
