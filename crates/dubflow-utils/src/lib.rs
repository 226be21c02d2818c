//! Shared utilities for the dubflow pipeline kernel.
//!
//! This crate holds the small, dependency-light building blocks the rest of
//! the workspace leans on: atomic file writes, SHA-256 fingerprinting over
//! files, directories, and canonical JSON, the workspace directory layout,
//! and tracing initialization.

pub mod atomic_write;
pub mod canonical;
pub mod fingerprint;
pub mod logging;
pub mod paths;
