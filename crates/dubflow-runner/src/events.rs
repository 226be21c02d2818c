//! Run events delivered to the caller while a pipeline executes.
//!
//! The runner is callable directly; its progress flows through an
//! [`EventSink`] instead of being scraped from a child process's stdout.
//! The stream controller bridges these events onto SSE.

/// One progress event from a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Log { line: String },
    PhaseStarted { name: String },
    PhaseSkipped { name: String },
    PhaseCompleted { name: String },
    PhaseFailed { name: String, message: String },
    GateOpened { key: String },
    Done { returncode: i32 },
}

/// Receiver for run events. Implementations must be cheap and non-blocking;
/// the runner emits from its single execution thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: RunEvent);
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: RunEvent) {}
}

/// Forwards events to the tracing subscriber; the default sink for CLI runs.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: RunEvent) {
        match event {
            RunEvent::Log { line } => tracing::info!("{line}"),
            RunEvent::PhaseStarted { name } => tracing::info!(phase = %name, "started"),
            RunEvent::PhaseSkipped { name } => tracing::info!(phase = %name, "skipped"),
            RunEvent::PhaseCompleted { name } => tracing::info!(phase = %name, "completed"),
            RunEvent::PhaseFailed { name, message } => {
                tracing::error!(phase = %name, "failed: {message}");
            }
            RunEvent::GateOpened { key } => tracing::info!(gate = %key, "gate opened"),
            RunEvent::Done { returncode } => tracing::info!(returncode, "run finished"),
        }
    }
}
