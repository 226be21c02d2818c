//! Frozen pipeline configuration.
//!
//! Configuration is resolved once at startup (defaults, then an optional
//! TOML file), validated, and passed into the runner as an immutable record.
//! Phases never read scattered global state; each phase declares the config
//! keys it depends on and the runner hands its fingerprint exactly that
//! slice, so turning an unrelated knob never invalidates a cache.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: Utf8PathBuf, reason: String },

    #[error("Invalid configuration: {reason}")]
    Invalid { reason: String },
}

/// The full configuration record for one pipeline invocation.
///
/// Field names are the keys phases list in their `config_keys` declaration;
/// [`PipelineConfig::slice`] projects the record onto such a key list for
/// fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    // ASR
    pub asr_preset: String,
    pub asr_hotwords: Vec<String>,

    // Subtitle segmentation
    pub sub_postprofile: String,
    pub utt_min_duration_ms: u64,
    pub utt_max_duration_ms: u64,

    // Re-segmentation
    pub reseg_enabled: bool,
    pub reseg_min_chars: usize,
    pub reseg_max_chars_trigger: usize,
    pub reseg_max_duration_trigger_ms: u64,

    // Translation
    pub mt_model: String,
    pub mt_temperature: f64,
    pub mt_target_lang: String,
    pub mt_dict_path: Option<Utf8PathBuf>,

    // Speech synthesis
    pub tts_engine: String,
    pub tts_max_workers: usize,
    pub tts_volume: f64,
    pub tts_mute_original: bool,

    // Mixing
    pub mix_target_lufs: f64,
    pub mix_true_peak_db: f64,

    // Runner behavior
    /// Gate keys active for this workspace; declared gates not listed here
    /// never open.
    pub gates: Vec<String>,
    /// When set, an on-disk fingerprint that differs from the manifest
    /// record fails the run instead of updating the record.
    pub strict_fingerprints: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            asr_preset: "asr_spk_semantic".to_string(),
            asr_hotwords: Vec::new(),
            sub_postprofile: "axis".to_string(),
            utt_min_duration_ms: 900,
            utt_max_duration_ms: 5000,
            reseg_enabled: true,
            reseg_min_chars: 6,
            reseg_max_chars_trigger: 25,
            reseg_max_duration_trigger_ms: 6000,
            mt_model: "gpt-4o-mini".to_string(),
            mt_temperature: 0.3,
            mt_target_lang: "en".to_string(),
            mt_dict_path: None,
            tts_engine: "volcengine".to_string(),
            tts_max_workers: 4,
            tts_volume: 1.4,
            tts_mute_original: false,
            mix_target_lufs: -16.0,
            mix_true_peak_db: -1.5,
            gates: Vec::new(),
            strict_fingerprints: false,
        }
    }
}

impl PipelineConfig {
    /// Load and validate: defaults overlaid with the TOML file at `path`
    /// when one is given.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let content = std::fs::read_to_string(path.as_std_path()).map_err(|source| {
                    ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject records that cannot drive a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.utt_min_duration_ms >= self.utt_max_duration_ms {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "utt_min_duration_ms ({}) must be below utt_max_duration_ms ({})",
                    self.utt_min_duration_ms, self.utt_max_duration_ms
                ),
            });
        }
        if self.tts_max_workers == 0 {
            return Err(ConfigError::Invalid {
                reason: "tts_max_workers must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.mt_temperature) {
            return Err(ConfigError::Invalid {
                reason: format!("mt_temperature ({}) must be within 0.0..=2.0", self.mt_temperature),
            });
        }
        if self.tts_volume <= 0.0 {
            return Err(ConfigError::Invalid {
                reason: "tts_volume must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Project the record onto `keys`, in key order.
    ///
    /// Unknown keys are simply absent from the slice, so a phase listing a
    /// key this version no longer carries hashes the same as one that never
    /// listed it.
    pub fn slice(&self, keys: &[&str]) -> BTreeMap<String, serde_json::Value> {
        let all = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        let Some(map) = all.as_object() else {
            return BTreeMap::new();
        };
        keys.iter()
            .filter_map(|k| map.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn load_without_file_is_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.tts_engine, "volcengine");
        assert!(config.gates.is_empty());
    }

    #[test]
    fn toml_file_overlays_defaults() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("dubflow.toml")).unwrap();
        std::fs::write(
            &path,
            "tts_engine = \"azure\"\ngates = [\"source_review\"]\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.tts_engine, "azure");
        assert_eq!(config.gates, vec!["source_review".to_string()]);
        // Untouched knobs keep defaults.
        assert_eq!(config.reseg_min_chars, 6);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("dubflow.toml")).unwrap();
        std::fs::write(&path, "no_such_knob = 1\n").unwrap();

        assert!(matches!(
            PipelineConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_window_bounds_fail_validation() {
        let config = PipelineConfig {
            utt_min_duration_ms: 5000,
            utt_max_duration_ms: 900,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn slice_projects_only_listed_keys() {
        let config = PipelineConfig::default();
        let slice = config.slice(&["tts_engine", "tts_volume"]);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice["tts_engine"], serde_json::json!("volcengine"));
        assert!(!slice.contains_key("mt_model"));
    }

    #[test]
    fn slice_of_unknown_key_is_empty() {
        let config = PipelineConfig::default();
        assert!(config.slice(&["retired_knob"]).is_empty());
    }
}
