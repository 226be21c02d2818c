//! Built-in deterministic processors.
//!
//! The provider-backed codecs (cloud ASR, LLM translation, neural TTS,
//! loudness-normalized mixing, hardware-accelerated burn-in) are external
//! collaborators; these processors are their deterministic stand-ins so the
//! pipeline kernel is executable and testable end to end without
//! credentials. Phases call through these modules and never bypass the
//! paths the runner allocated.

pub mod dict;
pub mod srt;
pub mod voices;
pub mod wav;
