// src/engine/run_controller.rs

//! Run state machine.
//!
//! Phases, strictly ordered and each gated by the run's ledger:
//! 1. version resolution (`VersionDetermined`)
//! 2. structure snapshot (`StructureLoaded`)
//! 3. scheduling, skipped while paused or terminated
//! 4. volume reclaim
//! 5. statistics rollup
//! 6. terminal determination
//!
//! A phase that changes anything persists the run and ends the pass, so
//! every pass commits at most one transition and a crash resumes at the
//! phase that was interrupted.

use tracing::{debug, info, warn};

use crate::api::{
    standard_labels, Kind, ObjectKey, ObjectMeta, PipelineDefinition, PipelineJob,
    PipelineJobSpec, PipelineRun, Record, RunOutcome, StepSpec,
};
use crate::dag::Scheduler;
use crate::errors::{OperatorError, Result};
use crate::exec::WorkloadExecutor;
use crate::materialize::{input_bindings, job_name};
use crate::status::{ConditionKey, ConditionStatus};
use crate::store::{Store, StoreError};

use super::{Action, Engine, PassOutcome};

pub const PHASE_VERSION_DETERMINED: &str = "Version determined";
pub const PHASE_STRUCTURE_LOADED: &str = "Structure loaded";
pub const PHASE_RUNNING: &str = "Running";

impl<S: Store, E: WorkloadExecutor> Engine<S, E> {
    /// One pass of the run state machine for the run at `key`.
    pub fn reconcile_run(&self, key: &ObjectKey) -> Result<PassOutcome> {
        let Some(mut run) = self.store().get::<PipelineRun>(key)? else {
            debug!(run = %key, "run no longer exists");
            return Ok(PassOutcome::Missing);
        };

        if !run.status.conditions.is_true(&ConditionKey::VersionDetermined) {
            return self.determine_version(&mut run);
        }
        if !run.status.conditions.is_true(&ConditionKey::StructureLoaded) {
            return self.load_structure(&mut run);
        }

        if !run.is_halted() {
            if let Some(action) = self.schedule(&mut run)? {
                return Ok(PassOutcome::Acted(action));
            }
        }

        let reclaimable = {
            let scheduler = snapshot_scheduler(&run)?;
            scheduler.reclaimable_step().map(|s| s.id.clone())
        };
        if let Some(step) = reclaimable {
            self.reclaim_volume(&mut run, &step)?;
            return Ok(PassOutcome::Acted(Action::VolumeReclaimed(step)));
        }

        let (counts, outcome) = {
            let scheduler = snapshot_scheduler(&run)?;
            (scheduler.step_counts(), scheduler.outcome())
        };

        if counts != run.status.counts() {
            debug!(run = %run.name(), %counts, "updating step statistics");
            run.status.set_counts(counts);
            self.store().update(&run)?;
            return Ok(PassOutcome::Acted(Action::StatisticsUpdated));
        }

        if run.status.outcome.is_none() {
            if let Some(outcome) = outcome {
                return self.record_outcome(&mut run, outcome);
            }
        }

        Ok(PassOutcome::Idle)
    }

    fn determine_version(&self, run: &mut PipelineRun) -> Result<PassOutcome> {
        let available: Vec<String> = self
            .store()
            .list::<PipelineDefinition>(&run.metadata.namespace)?
            .into_iter()
            .filter(|d| d.spec.name == run.spec.pipeline_name)
            .map(|d| d.spec.version)
            .collect();

        let Some(version) = self.resolver.resolve(&run.spec.version_pattern, &available) else {
            let wanted = format!("{}@{}", run.spec.pipeline_name, run.spec.version_pattern);
            return self.definition_missing(run, wanted);
        };

        info!(run = %run.name(), %version, "determined pipeline version");
        run.status.pipeline_version = Some(version.clone());
        run.status.conditions.set(
            ConditionKey::VersionDetermined,
            ConditionStatus::True,
            format!("Version {version}"),
        );
        run.status.phase = Some(PHASE_VERSION_DETERMINED.to_string());
        self.store().update(run)?;
        Ok(PassOutcome::Acted(Action::VersionResolved(version)))
    }

    fn load_structure(&self, run: &mut PipelineRun) -> Result<PassOutcome> {
        let name = run.definition_name().ok_or_else(|| {
            OperatorError::Invariant(format!(
                "run {} has VersionDetermined but no version",
                run.name()
            ))
        })?;
        let def_key = ObjectKey::new(run.metadata.namespace.clone(), name.clone());

        let Some(definition) = self.store().get::<PipelineDefinition>(&def_key)? else {
            return self.definition_missing(run, name);
        };

        let structure = definition.spec.structure.snapshot();
        info!(
            run = %run.name(),
            definition = %name,
            steps = structure.steps.len(),
            pipes = structure.pipes.len(),
            "loaded pipeline structure"
        );
        run.status.steps_total = structure.steps.len();
        run.status.structure = Some(structure);
        run.status.conditions.set(
            ConditionKey::StructureLoaded,
            ConditionStatus::True,
            format!("Structure loaded from {name}"),
        );
        run.status.phase = Some(PHASE_STRUCTURE_LOADED.to_string());
        self.store().update(run)?;
        Ok(PassOutcome::Acted(Action::StructureLoaded))
    }

    /// Surface a missing definition without failing the run; the pass
    /// aborts and the next resync retries.
    fn definition_missing(&self, run: &mut PipelineRun, name: String) -> Result<PassOutcome> {
        let err = OperatorError::DefinitionNotFound(name);
        let phase = format!("Error ({err})");
        self.events()
            .warning(Kind::PipelineRun, &run.key(), "DefinitionNotFound", err.to_string());
        if run.status.phase.as_deref() != Some(phase.as_str()) {
            run.status.phase = Some(phase);
            self.store().update(run)?;
        }
        Err(err)
    }

    /// Scheduling phase: repair an active step whose unit of work is gone,
    /// otherwise start the first startable step.
    fn schedule(&self, run: &mut PipelineRun) -> Result<Option<Action>> {
        let (orphaned, startable) = {
            let scheduler = snapshot_scheduler(run)?;
            let mut orphaned = None;
            for step in scheduler.active_steps() {
                let key = ObjectKey::new(
                    run.metadata.namespace.clone(),
                    job_name(run.name(), &step.id),
                );
                if self.store().get::<PipelineJob>(&key)?.is_none() {
                    orphaned = Some(step.clone());
                    break;
                }
            }
            (orphaned, scheduler.startable_step().cloned())
        };

        if let Some(step) = orphaned {
            warn!(run = %run.name(), step = %step.id, "active step has no unit of work; recreating");
            self.ensure_volume(run, &step)?;
            self.replace_job(run, &step)?;
            return Ok(Some(Action::JobRecreated(step.id)));
        }

        let Some(step) = startable else {
            return Ok(None);
        };

        // Volume before ledger before unit of work: every prefix of this
        // sequence is picked up again by the next pass.
        self.ensure_volume(run, &step)?;
        let status = &mut run.status.conditions;
        status.set(
            ConditionKey::step_success(&step.id),
            ConditionStatus::Unknown,
            format!("Step {} started", step.id),
        );
        status.set(
            ConditionKey::volume(&step.id),
            ConditionStatus::True,
            "Volume created",
        );
        // A recorded outcome keeps its phase while independent steps finish.
        if run.status.outcome.is_none() {
            run.status.phase = Some(PHASE_RUNNING.to_string());
        }
        *run = self.store().update(run)?;

        self.replace_job(run, &step)?;
        self.events().normal(
            Kind::PipelineRun,
            &run.key(),
            "StepScheduled",
            format!("Scheduled step {}", step.id),
        );
        Ok(Some(Action::StepScheduled(step.id)))
    }

    /// Create the unit of work for `step`, replacing any same-named record.
    fn replace_job(&self, run: &PipelineRun, step: &StepSpec) -> Result<()> {
        let job = self.unit_of_work(run, step)?;
        let key = job.key();
        match self.store().create(&job) {
            Ok(_) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(job = %key, "replacing existing unit of work");
                self.executor().delete(&key.name)?;
                self.store().delete::<PipelineJob>(&key)?;
                self.store().create(&job)?;
            }
            Err(e) => return Err(e.into()),
        }
        info!(run = %run.name(), step = %step.id, job = %key.name, "created unit of work");
        Ok(())
    }

    fn unit_of_work(&self, run: &PipelineRun, step: &StepSpec) -> Result<PipelineJob> {
        let scheduler = snapshot_scheduler(run)?;
        let definition = run.definition_name().ok_or_else(|| {
            OperatorError::Invariant(format!("run {} has no resolved version", run.name()))
        })?;
        let name = job_name(run.name(), &step.id);

        Ok(PipelineJob {
            metadata: ObjectMeta::new(run.metadata.namespace.clone(), name)
                .owned_by(run)
                .with_labels(standard_labels(&step.id, run.name())),
            spec: PipelineJobSpec {
                pipeline_run: run.name().to_string(),
                pipeline_definition: definition,
                step_id: step.id.clone(),
                description: step.description.clone(),
                inputs: input_bindings(run.name(), scheduler.graph(), &step.id),
                job: step.job.clone(),
            },
            status: Default::default(),
        })
    }

    fn record_outcome(&self, run: &mut PipelineRun, outcome: RunOutcome) -> Result<PassOutcome> {
        let key = match outcome {
            RunOutcome::Succeeded => ConditionKey::Succeeded,
            RunOutcome::Failed => ConditionKey::Failed,
        };
        run.status.outcome = Some(outcome);
        run.status
            .conditions
            .set(key, ConditionStatus::True, format!("Run {outcome}"));
        run.status.phase = Some(outcome.to_string());
        self.store().update(run)?;

        let reason = format!("Run{outcome}");
        match outcome {
            RunOutcome::Succeeded => {
                self.events()
                    .normal(Kind::PipelineRun, &run.key(), &reason, "All steps succeeded")
            }
            RunOutcome::Failed => {
                self.events()
                    .warning(Kind::PipelineRun, &run.key(), &reason, "A step failed")
            }
        }
        Ok(PassOutcome::Acted(Action::OutcomeRecorded(outcome)))
    }
}

fn snapshot_scheduler(run: &PipelineRun) -> Result<Scheduler<'_>> {
    Scheduler::for_run(run).ok_or_else(|| {
        OperatorError::Invariant(format!(
            "run {} has StructureLoaded but no structure snapshot",
            run.name()
        ))
    })
}
