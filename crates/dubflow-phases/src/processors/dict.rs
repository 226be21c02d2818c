//! Dictionary-backed translation.
//!
//! The stand-in for the LLM translator: longest-match term replacement from
//! an optional TOML dictionary, with a tagged passthrough for text nothing
//! matched. Deterministic by construction, which is what the input
//! fingerprint contract needs from the translation step.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DictTranslator {
    /// Source term → target term, matched longest-first.
    entries: BTreeMap<String, String>,
    target_lang: String,
}

impl DictTranslator {
    /// Build a translator for `target_lang`, loading the TOML dictionary at
    /// `dict_path` when one is configured. The file is a flat table of
    /// `source = "target"` pairs.
    pub fn load(dict_path: Option<&Utf8Path>, target_lang: &str) -> Result<Self> {
        let entries = match dict_path {
            None => BTreeMap::new(),
            Some(path) => {
                let content = std::fs::read_to_string(path.as_std_path())
                    .with_context(|| format!("Failed to read MT dictionary: {path}"))?;
                toml::from_str(&content)
                    .with_context(|| format!("Malformed MT dictionary: {path}"))?
            }
        };
        Ok(Self {
            entries,
            target_lang: target_lang.to_string(),
        })
    }

    /// Translate one line. Returns the translated text and whether any
    /// dictionary entry applied.
    pub fn translate(&self, text: &str) -> (String, bool) {
        let mut result = text.to_string();
        let mut hit = false;

        // Longest source terms first so "New York City" wins over "New York".
        let mut terms: Vec<(&String, &String)> = self.entries.iter().collect();
        terms.sort_by_key(|(source, _)| std::cmp::Reverse(source.len()));

        for (source, target) in terms {
            if result.contains(source.as_str()) {
                result = result.replace(source.as_str(), target);
                hit = true;
            }
        }

        if hit {
            (result, true)
        } else {
            (format!("[{}] {}", self.target_lang, text), false)
        }
    }
}
