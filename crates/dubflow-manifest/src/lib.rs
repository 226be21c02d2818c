//! The manifest: a content-addressed journal of one workspace.
//!
//! The manifest is the workspace's persistent state (the current artifact
//! registry, per-phase execution records, and gate states) stored as a
//! single canonical-JSON document that survives between invocations. Every
//! save goes through the atomic writer, so the on-disk file is always either
//! the prior state or the new state, never a torn mix.

mod model;
mod store;

pub use model::{
    Artifact, ArtifactKind, ErrorInfo, GateState, GateStatus, PhaseRecord, PhaseStatus, Producer,
};
pub use store::{Manifest, ManifestError, SCHEMA_VERSION};
