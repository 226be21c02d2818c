//! Canonical JSON emission (JCS, RFC 8785).
//!
//! All JSON the pipeline hashes or persists as a contract (the manifest,
//! phase config slices, fingerprint inputs) is emitted through JCS so the
//! bytes are deterministic regardless of struct field order or platform.

use anyhow::{Context, Result};
use serde::Serialize;

/// Emit a value as JCS-canonical JSON: UTF-8, keys sorted at every nesting
/// level, no insignificant whitespace, shortest round-tripping numbers.
pub fn emit_jcs<T: Serialize>(value: &T) -> Result<String> {
    let json_value =
        serde_json::to_value(value).with_context(|| "Failed to serialize value to JSON")?;
    let json_bytes = serde_json_canonicalizer::to_vec(&json_value)
        .with_context(|| "Failed to canonicalize JSON using JCS")?;
    String::from_utf8(json_bytes).with_context(|| "JCS output contained invalid UTF-8")
}
