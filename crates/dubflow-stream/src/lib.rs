//! The stream controller: surfaces runner progress over long-lived SSE
//! streams, enforces one live run per episode, and serves the status and
//! gate-passing API.
//!
//! The runner is called directly on a blocking task with its events
//! delivered over a channel, with no child process and no stdout
//! scraping, though the controller still derives `phase` events from log lines as a
//! best-effort aid for lines that carry no structured counterpart.

mod events;
mod routes;
mod state;
mod status;

pub use events::{derive_phase, sse_pairs};
pub use routes::{router, serve};
pub use state::{AppState, RunHandle};
pub use status::{GateView, PhaseView, PipelineStatus, StageView, pipeline_status_for};
