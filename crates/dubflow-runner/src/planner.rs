//! Execution planning: which phases one invocation will consider.
//!
//! The plan is the registry-order slice `[from..=to]` plus a force set.
//! Forcing is explicit and closed downstream: `--from`, any phase whose
//! recorded version drifted from the registry, and everything reachable
//! from a forced phase through `provides`/`requires` edges, computed once
//! at plan time. The planner never decides skip-vs-run for non-forced
//! phases; that is the runner's per-phase fingerprint decision.

use std::collections::BTreeSet;

use dubflow_manifest::Manifest;
use dubflow_phase_api::PhaseSpec;

use crate::error::RunnerError;

/// Ordered list of phases to consider, with the force set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub phases: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub force: BTreeSet<String>,
}

/// Build the plan for one invocation.
pub fn build_plan(
    registry: &[PhaseSpec],
    manifest: &Manifest,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<ExecutionPlan, RunnerError> {
    let index_of = |name: &str| {
        registry
            .iter()
            .position(|spec| spec.name == name)
            .ok_or_else(|| RunnerError::UnknownPhase {
                name: name.to_string(),
            })
    };

    let start_idx = from.map(&index_of).transpose()?.unwrap_or(0);
    let end_idx = to.map(&index_of).transpose()?.unwrap_or(registry.len() - 1);

    let phases: Vec<String> = if end_idx < start_idx {
        Vec::new()
    } else {
        registry[start_idx..=end_idx]
            .iter()
            .map(|spec| spec.name.to_string())
            .collect()
    };

    // Seed the force set: explicit restart point plus version drift.
    let mut force: BTreeSet<String> = BTreeSet::new();
    if let Some(from) = from {
        force.insert(from.to_string());
    }
    for spec in registry {
        if let Some(record) = manifest.get_phase(spec.name) {
            if record.version != spec.version {
                force.insert(spec.name.to_string());
            }
        }
    }

    // Close downstream: a consumer of any forced phase's output is forced
    // too. One forward pass suffices because registry order is topological.
    let mut forced_keys: BTreeSet<&str> = BTreeSet::new();
    for spec in registry {
        let downstream_of_forced = spec.requires.iter().any(|key| forced_keys.contains(key));
        if downstream_of_forced {
            force.insert(spec.name.to_string());
        }
        if force.contains(spec.name) {
            forced_keys.extend(spec.provides_keys());
        }
    }

    Ok(ExecutionPlan {
        phases,
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        force,
    })
}
