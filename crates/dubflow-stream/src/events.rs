//! Mapping from runner events to SSE frames.
//!
//! A client reads the stream line by line; each logical event is
//! `event: <type>` / `data: <json>` terminated by an empty line. Event
//! types are `log`, `phase`, `gate`, `done`, `error`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Mutex;

use dubflow_runner::{EventSink, RunEvent};

/// `phase <name> running` / `phase <name> starting`, case-insensitive.
static PHASE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)phase\s+([a-z0-9_]+)\s+(?:running|starting)")
        .unwrap_or_else(|e| panic!("phase-line regex is invalid: {e}"))
});

/// Best-effort phase detection from a log line.
pub fn derive_phase(line: &str) -> Option<String> {
    PHASE_LINE
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Translate one runner event into zero or more `(event_type, payload)`
/// SSE pairs. `last_phase` deduplicates phase announcements between the
/// structured event and the log-line derivation of the same transition.
pub fn sse_pairs(
    event: &RunEvent,
    last_phase: &mut Option<String>,
) -> Vec<(&'static str, serde_json::Value)> {
    match event {
        RunEvent::Log { line } => {
            let mut pairs = vec![("log", serde_json::json!({ "line": line }))];
            if let Some(name) = derive_phase(line) {
                if last_phase.as_deref() != Some(name.as_str()) {
                    *last_phase = Some(name.clone());
                    pairs.push(("phase", serde_json::json!({ "name": name })));
                }
            }
            pairs
        }
        RunEvent::PhaseStarted { name } => {
            if last_phase.as_deref() == Some(name.as_str()) {
                Vec::new()
            } else {
                *last_phase = Some(name.clone());
                vec![("phase", serde_json::json!({ "name": name }))]
            }
        }
        // Skip/complete/fail transitions surface through their log lines
        // and the terminal error/done frames.
        RunEvent::PhaseSkipped { .. } | RunEvent::PhaseCompleted { .. } => Vec::new(),
        RunEvent::PhaseFailed { .. } => Vec::new(),
        RunEvent::GateOpened { key } => {
            vec![("gate", serde_json::json!({ "key": key }))]
        }
        RunEvent::Done { returncode } => {
            vec![("done", serde_json::json!({ "returncode": returncode }))]
        }
    }
}

/// Event sink that frames runner events into SSE pairs on a channel.
pub struct SseSink {
    tx: tokio::sync::mpsc::UnboundedSender<(&'static str, serde_json::Value)>,
    last_phase: Mutex<Option<String>>,
}

impl SseSink {
    pub fn new(
        tx: tokio::sync::mpsc::UnboundedSender<(&'static str, serde_json::Value)>,
    ) -> Self {
        Self {
            tx,
            last_phase: Mutex::new(None),
        }
    }
}

impl EventSink for SseSink {
    fn emit(&self, event: RunEvent) {
        let Ok(mut last_phase) = self.last_phase.lock() else {
            return;
        };
        for pair in sse_pairs(&event, &mut last_phase) {
            // A closed receiver just means the client went away.
            let _ = self.tx.send(pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_phase_matches_runner_log_lines() {
        assert_eq!(
            derive_phase("phase extract running: Audio extraction v1.0.0"),
            Some("extract".to_string())
        );
        assert_eq!(
            derive_phase("Phase MT starting"),
            Some("mt".to_string())
        );
        assert_eq!(derive_phase("phase tts completed"), None);
        assert_eq!(derive_phase("nothing to see"), None);
    }

    #[test]
    fn log_line_emits_log_and_derived_phase_once() {
        let mut last = None;
        let pairs = sse_pairs(
            &RunEvent::Log {
                line: "phase asr running: Speech recognition v1.0.0".to_string(),
            },
            &mut last,
        );
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "log");
        assert_eq!(pairs[1], ("phase", serde_json::json!({"name": "asr"})));

        // The structured start of the same phase does not repeat it.
        let pairs = sse_pairs(
            &RunEvent::PhaseStarted {
                name: "asr".to_string(),
            },
            &mut last,
        );
        assert!(pairs.is_empty());
    }

    #[test]
    fn gate_and_done_frames() {
        let mut last = None;
        assert_eq!(
            sse_pairs(
                &RunEvent::GateOpened {
                    key: "source_review".to_string()
                },
                &mut last
            ),
            vec![("gate", serde_json::json!({"key": "source_review"}))]
        );
        assert_eq!(
            sse_pairs(&RunEvent::Done { returncode: 0 }, &mut last),
            vec![("done", serde_json::json!({"returncode": 0}))]
        );
    }

    #[test]
    fn plain_log_lines_do_not_announce_phases() {
        let mut last = None;
        let pairs = sse_pairs(
            &RunEvent::Log {
                line: "gate source_review opened after phase reseg".to_string(),
            },
            &mut last,
        );
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "log");
    }
}
