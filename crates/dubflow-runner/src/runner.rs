//! The phase runner: executes a plan against one workspace.

use camino::Utf8PathBuf;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dubflow_manifest::{
    Artifact, ErrorInfo, Manifest, PhaseRecord, PhaseStatus, Producer,
};
use dubflow_phase_api::{
    GateSpec, Phase, PhaseOutcome, PhaseSpec, ResolvedOutputs, RunContext,
};
use dubflow_utils::canonical::emit_jcs;
use dubflow_utils::fingerprint::combined;

use crate::error::RunnerError;
use crate::events::{EventSink, RunEvent};
use crate::fingerprints::artifact_fingerprint;
use crate::planner::ExecutionPlan;

/// What happened to one phase during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseRunRecord {
    pub name: String,
    pub status: PhaseStatus,
    pub skipped: bool,
}

/// Outcome of one `run` call.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Per-phase outcomes in execution order, skipped phases included.
    pub phases: Vec<PhaseRunRecord>,
    /// Set when the run halted at an unpassed gate; later phases were not
    /// considered. Exit status is still success.
    pub halted_at_gate: Option<String>,
    pub manifest_path: Utf8PathBuf,
}

/// Executes an [`ExecutionPlan`] sequentially against one workspace.
///
/// Single-threaded and cooperative: the only suspension point is the phase
/// invocation itself, and manifest writes serialize after each phase. A
/// phase is never invoked twice in the same call.
pub struct PhaseRunner<'a> {
    registry: &'a [PhaseSpec],
    /// Gates active for this workspace, in declaration order.
    gates: Vec<GateSpec>,
    manifest: Manifest,
    ctx: RunContext,
    sink: &'a dyn EventSink,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        registry: &'a [PhaseSpec],
        gates: Vec<GateSpec>,
        manifest: Manifest,
        ctx: RunContext,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            registry,
            gates,
            manifest,
            ctx,
            sink,
            cancel: None,
        }
    }

    /// Observe a cooperative cancel flag between phases.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Run the plan. Stops at the first failed phase (error), at the first
    /// unpassed gate (success), or after the last planned phase.
    pub fn run(mut self, plan: &ExecutionPlan) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary {
            phases: Vec::new(),
            halted_at_gate: None,
            manifest_path: self.manifest.path().to_path_buf(),
        };

        for name in &plan.phases {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::SeqCst) {
                    return Err(RunnerError::Cancelled);
                }
            }

            let spec = self
                .registry
                .iter()
                .find(|s| s.name == name.as_str())
                .ok_or_else(|| RunnerError::UnknownPhase { name: name.clone() })?;

            let executed = self.run_phase(spec, plan)?;
            summary.phases.push(executed);

            if let Some(gate_key) = self.check_gate(spec.name)? {
                summary.halted_at_gate = Some(gate_key);
                break;
            }
        }

        Ok(summary)
    }

    /// Steps 1–9 of the per-phase loop: resolve, refresh, fingerprint,
    /// decide, allocate, invoke, commit or record failure.
    fn run_phase(
        &mut self,
        spec: &PhaseSpec,
        plan: &ExecutionPlan,
    ) -> Result<PhaseRunRecord, RunnerError> {
        // Resolve inputs. Only the pipeline root (no requires) is exempt
        // from the existence check.
        let mut inputs: BTreeMap<String, Artifact> = BTreeMap::new();
        for key in &spec.requires {
            let artifact = self.manifest.get_artifact(key).cloned().ok_or_else(|| {
                RunnerError::MissingInput {
                    key: (*key).to_string(),
                    phase: spec.name.to_string(),
                }
            })?;
            inputs.insert((*key).to_string(), artifact);
        }

        // Refresh upstream fingerprints from disk. A drift is legitimate in
        // default mode (bless, manual edit); strict mode makes it fatal.
        let mut manifest_dirty = false;
        for artifact in inputs.values_mut() {
            let actual = artifact_fingerprint(&self.ctx.workspace, artifact)?;
            if actual != artifact.fingerprint {
                if self.ctx.config.strict_fingerprints {
                    return Err(RunnerError::FingerprintMismatch {
                        key: artifact.key.clone(),
                        recorded: artifact.fingerprint.clone(),
                        actual,
                    });
                }
                tracing::debug!(key = %artifact.key, "refreshing drifted input fingerprint");
                artifact.fingerprint = actual;
                self.manifest.put_artifact(artifact.clone());
                manifest_dirty = true;
            }
        }
        if manifest_dirty {
            self.manifest.save()?;
        }

        let input_fingerprint = self.input_fingerprint(spec, &inputs)?;

        // Skip decision.
        if !plan.force.contains(spec.name) && self.can_skip(spec, &input_fingerprint) {
            if let Some(record) = self.manifest.get_phase(spec.name) {
                let mut record = record.clone();
                record.skipped = true;
                self.manifest.put_phase(record);
                self.manifest.save()?;
            }
            self.sink.emit(RunEvent::Log {
                line: format!("phase {} skipped (inputs unchanged)", spec.name),
            });
            self.sink.emit(RunEvent::PhaseSkipped {
                name: spec.name.to_string(),
            });
            return Ok(PhaseRunRecord {
                name: spec.name.to_string(),
                status: PhaseStatus::Succeeded,
                skipped: true,
            });
        }

        // Allocate output paths from the declaration table.
        let mut outputs = ResolvedOutputs::default();
        for decl in &spec.provides {
            outputs.insert(decl.key, self.ctx.workspace.join(decl.relpath));
        }

        // Pre-run record, persisted before the phase is invoked so a crash
        // mid-phase is visible as `running` and never satisfies a later
        // skip decision.
        self.manifest
            .put_phase(PhaseRecord::running(spec.name, &spec.version, &input_fingerprint));
        self.manifest.save()?;

        self.sink.emit(RunEvent::Log {
            line: format!("phase {} running: {} v{}", spec.name, spec.label, spec.version),
        });
        self.sink.emit(RunEvent::PhaseStarted {
            name: spec.name.to_string(),
        });

        let result = self.invoke(spec.instance(), &inputs, &outputs);

        // Enforce outputs ⊆ provides before committing anything.
        let result = match result {
            Ok(result) => {
                if let Some(extra) = result
                    .outputs
                    .iter()
                    .find(|key| spec.decl(key).is_none())
                {
                    dubflow_phase_api::PhaseResult::failed(
                        "ContractViolation",
                        format!("phase produced undeclared output key: {extra}"),
                    )
                } else {
                    result
                }
            }
            Err(e) => {
                dubflow_phase_api::PhaseResult::failed("PhaseError", format!("{e:#}"))
            }
        };

        for warning in &result.warnings {
            tracing::warn!(phase = spec.name, "{warning}");
            self.sink.emit(RunEvent::Log {
                line: format!("phase {} warning: {warning}", spec.name),
            });
        }

        match result.status {
            PhaseOutcome::Succeeded => {
                self.commit(spec, &input_fingerprint, result)?;
                self.sink.emit(RunEvent::Log {
                    line: format!("phase {} completed", spec.name),
                });
                self.sink.emit(RunEvent::PhaseCompleted {
                    name: spec.name.to_string(),
                });
                Ok(PhaseRunRecord {
                    name: spec.name.to_string(),
                    status: PhaseStatus::Succeeded,
                    skipped: false,
                })
            }
            PhaseOutcome::Failed => {
                let error = result.error.clone().unwrap_or(ErrorInfo {
                    kind: "PhaseError".to_string(),
                    message: "phase reported failure without detail".to_string(),
                    traceback: None,
                });
                let message = error.message.clone();
                self.record_failure(spec, &input_fingerprint, result, error)?;
                self.sink.emit(RunEvent::Log {
                    line: format!("phase {} failed: {message}", spec.name),
                });
                self.sink.emit(RunEvent::PhaseFailed {
                    name: spec.name.to_string(),
                    message: message.clone(),
                });
                Err(RunnerError::PhaseExecution {
                    phase: spec.name.to_string(),
                    message,
                })
            }
        }
    }

    fn invoke(
        &self,
        phase: &dyn Phase,
        inputs: &BTreeMap<String, Artifact>,
        outputs: &ResolvedOutputs,
    ) -> anyhow::Result<dubflow_phase_api::PhaseResult> {
        phase.run(&self.ctx, inputs, outputs)
    }

    /// Combined fingerprint over required inputs (in declaration order),
    /// the phase version, and its canonical config slice.
    fn input_fingerprint(
        &self,
        spec: &PhaseSpec,
        inputs: &BTreeMap<String, Artifact>,
    ) -> Result<String, RunnerError> {
        let entries: Vec<(String, String)> = spec
            .requires
            .iter()
            .filter_map(|key| {
                inputs
                    .get(*key)
                    .map(|a| ((*key).to_string(), a.fingerprint.clone()))
            })
            .collect();
        let config_slice = emit_jcs(&self.ctx.config.slice(spec.config_keys))?;
        let extras = vec![spec.version.clone(), config_slice];
        Ok(combined(&entries, &extras)?)
    }

    /// A phase is skippable when its last record succeeded at this version
    /// with this input fingerprint and every recorded output is still on
    /// disk, byte-identical to the registry entry.
    fn can_skip(&self, spec: &PhaseSpec, input_fingerprint: &str) -> bool {
        let Some(record) = self.manifest.get_phase(spec.name) else {
            return false;
        };
        if record.status != PhaseStatus::Succeeded
            || record.version != spec.version
            || record.input_fingerprint != input_fingerprint
        {
            return false;
        }
        record.output_keys.iter().all(|key| {
            let Some(artifact) = self.manifest.get_artifact(key) else {
                return false;
            };
            match artifact_fingerprint(&self.ctx.workspace, artifact) {
                // The CalDoc is edited in place by humans; any readable
                // content keeps its producer skipped, and consumers pick up
                // the drift through their own input refresh.
                Ok(_) if artifact.key == dubflow_caldoc::CALDOC_KEY => true,
                Ok(actual) => actual == artifact.fingerprint,
                Err(_) => false,
            }
        })
    }

    /// Commit step: fingerprint and register each produced artifact, then
    /// finalize the phase record. Persisted as one manifest save.
    fn commit(
        &mut self,
        spec: &PhaseSpec,
        input_fingerprint: &str,
        result: dubflow_phase_api::PhaseResult,
    ) -> Result<(), RunnerError> {
        for key in &result.outputs {
            // Contract enforcement above guarantees the declaration exists.
            let Some(decl) = spec.decl(key) else {
                continue;
            };
            let mut artifact = Artifact {
                key: key.clone(),
                relpath: Utf8PathBuf::from(decl.relpath),
                kind: decl.kind,
                fingerprint: String::new(),
                producer: Producer {
                    name: spec.name.to_string(),
                    version: spec.version.clone(),
                },
                meta: BTreeMap::new(),
            };
            artifact.fingerprint = artifact_fingerprint(&self.ctx.workspace, &artifact)?;
            self.manifest.put_artifact(artifact);
        }

        let mut record = self
            .manifest
            .get_phase(spec.name)
            .cloned()
            .unwrap_or_else(|| PhaseRecord::running(spec.name, &spec.version, input_fingerprint));
        record.status = PhaseStatus::Succeeded;
        record.finished_at = Some(Utc::now());
        record.output_keys = result.outputs;
        record.metrics = result.metrics;
        record.error = None;
        record.skipped = false;
        record.input_fingerprint = input_fingerprint.to_string();
        self.manifest.put_phase(record);
        self.manifest.save()?;
        Ok(())
    }

    /// Failure step: the record keeps the phase's error verbatim. Partial
    /// files are left in place; they were never promoted to artifacts and
    /// the next run overwrites them.
    fn record_failure(
        &mut self,
        spec: &PhaseSpec,
        input_fingerprint: &str,
        result: dubflow_phase_api::PhaseResult,
        error: ErrorInfo,
    ) -> Result<(), RunnerError> {
        let mut record = self
            .manifest
            .get_phase(spec.name)
            .cloned()
            .unwrap_or_else(|| PhaseRecord::running(spec.name, &spec.version, input_fingerprint));
        record.status = PhaseStatus::Failed;
        record.finished_at = Some(Utc::now());
        record.metrics = result.metrics;
        record.error = Some(error);
        record.skipped = false;
        self.manifest.put_phase(record);
        self.manifest.save()?;
        Ok(())
    }

    /// Gate check after a phase (run or skipped): an unpassed gate halts
    /// the run, opening it first if it was pending. Passing is external and
    /// idempotent; a gate never causes re-execution.
    fn check_gate(&mut self, phase_name: &str) -> Result<Option<String>, RunnerError> {
        let Some(gate) = self.gates.iter().find(|g| g.after_phase == phase_name) else {
            return Ok(None);
        };
        match self.manifest.gate_status(gate.key) {
            dubflow_manifest::GateStatus::Passed => Ok(None),
            dubflow_manifest::GateStatus::Pending => {
                self.manifest.open_gate(gate.key);
                self.manifest.save()?;
                self.sink.emit(RunEvent::Log {
                    line: format!("gate {} opened after phase {phase_name}", gate.key),
                });
                self.sink.emit(RunEvent::GateOpened {
                    key: gate.key.to_string(),
                });
                Ok(Some(gate.key.to_string()))
            }
            dubflow_manifest::GateStatus::Open => {
                self.sink.emit(RunEvent::Log {
                    line: format!("gate {} awaiting review", gate.key),
                });
                self.sink.emit(RunEvent::GateOpened {
                    key: gate.key.to_string(),
                });
                Ok(Some(gate.key.to_string()))
            }
        }
    }
}
