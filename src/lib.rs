//! dubflow: an incremental, content-addressed pipeline runner for a video
//! dubbing workflow.
//!
//! A workspace is re-entered many times, from different starting points
//! and to different end points, with human review gates in between; the
//! runner recomputes exactly the phases whose transitive inputs changed.
//! This crate wires the workspace members together behind the CLI binary;
//! the kernel lives in the `dubflow-*` crates.

pub mod cli;

pub use dubflow_caldoc as caldoc;
pub use dubflow_config as config;
pub use dubflow_manifest as manifest;
pub use dubflow_phase_api as phase_api;
pub use dubflow_phases as phases;
pub use dubflow_runner as runner;
pub use dubflow_stream as stream;
pub use dubflow_utils as utils;
