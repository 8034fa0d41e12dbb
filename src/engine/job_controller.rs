// src/engine/job_controller.rs

//! Unit-of-work reconciler.
//!
//! Submits the workload of a [`PipelineJob`] once, then mirrors the
//! executor's phase into the owning run's `success-<step>` condition. The
//! run ledger is written before the job's own ledger, so a propagation
//! interrupted in between is repeated by the next pass.

use tracing::{debug, info, warn};

use crate::api::{Kind, ObjectKey, PipelineJob, PipelineRun, Record};
use crate::errors::Result;
use crate::exec::{WorkloadExecutor, WorkloadPhase};
use crate::materialize::materialize;
use crate::status::{ConditionKey, ConditionStatus};
use crate::store::Store;

use super::{Action, Engine, PassOutcome};

pub const STATE_CREATED: &str = "Job created";

impl From<WorkloadPhase> for ConditionStatus {
    fn from(phase: WorkloadPhase) -> Self {
        match phase {
            WorkloadPhase::Running => ConditionStatus::Unknown,
            WorkloadPhase::Succeeded => ConditionStatus::True,
            WorkloadPhase::Failed => ConditionStatus::False,
        }
    }
}

fn state_for(status: ConditionStatus) -> &'static str {
    match status {
        ConditionStatus::Unknown => "Created",
        ConditionStatus::True => "Done",
        ConditionStatus::False => "Failed",
    }
}

/// A job whose `JobSucceeded` condition is true or false is finished.
fn is_terminal(job: &PipelineJob) -> bool {
    matches!(
        job.status.conditions.status(&ConditionKey::JobSucceeded),
        Some(ConditionStatus::True | ConditionStatus::False)
    )
}

impl<S: Store, E: WorkloadExecutor> Engine<S, E> {
    /// One pass of the unit-of-work reconciler for the job at `key`.
    pub fn reconcile_job(&self, key: &ObjectKey) -> Result<PassOutcome> {
        let Some(mut job) = self.store().get::<PipelineJob>(key)? else {
            return Ok(PassOutcome::Missing);
        };
        let run_key = ObjectKey::new(key.namespace.clone(), job.spec.pipeline_run.clone());
        let Some(mut run) = self.store().get::<PipelineRun>(&run_key)? else {
            debug!(job = %key, "owning run is gone; waiting for cascade");
            return Ok(PassOutcome::Missing);
        };

        if !job.status.conditions.is_true(&ConditionKey::JobCreated) {
            return self.submit(&mut job, &mut run);
        }

        let observed = match self.executor().phase(&key.name)? {
            Some(phase) => ConditionStatus::from(phase),
            None if is_terminal(&job) => {
                // The workload is gone but its result was recorded; make sure
                // the run has seen it.
                let status = job
                    .status
                    .conditions
                    .status(&ConditionKey::JobSucceeded)
                    .unwrap_or(ConditionStatus::Unknown);
                return self.propagate(&mut job, &mut run, status);
            }
            None => {
                warn!(job = %key, "workload unknown to executor; resubmitting");
                return self.submit(&mut job, &mut run);
            }
        };
        self.propagate(&mut job, &mut run, observed)
    }

    fn submit(&self, job: &mut PipelineJob, run: &mut PipelineRun) -> Result<PassOutcome> {
        if is_terminal(job) {
            return Ok(PassOutcome::Idle);
        }

        let descriptor = match materialize(job) {
            Ok(d) => d,
            Err(err) => return self.reject(job, run, &err.to_string()),
        };

        // Replace semantics: never adopt a same-named workload.
        if self.executor().delete(&descriptor.name)? {
            debug!(job = %job.key(), "deleted previous workload before resubmitting");
        }
        match self.executor().submit(&descriptor) {
            Ok(id) => info!(job = %job.key(), workload = %id, "submitted workload"),
            Err(err) if err.is_rejection() => return self.reject(job, run, &err.to_string()),
            Err(err) => return Err(err.into()),
        }

        job.status
            .conditions
            .set(ConditionKey::JobCreated, ConditionStatus::True, STATE_CREATED);
        job.status.state = Some(STATE_CREATED.to_string());
        self.store().update(job)?;
        self.events()
            .normal(Kind::PipelineJob, &job.key(), "WorkloadSubmitted", "Workload submitted");
        Ok(PassOutcome::Acted(Action::WorkloadSubmitted))
    }

    /// The step cannot run at all: fail it on the run, then the job.
    fn reject(&self, job: &mut PipelineJob, run: &mut PipelineRun, cause: &str) -> Result<PassOutcome> {
        let step = job.spec.step_id.clone();
        self.events().warning(
            Kind::PipelineJob,
            &job.key(),
            "WorkloadRejected",
            format!("Step {step}: {cause}"),
        );

        if run.status.conditions.set(
            ConditionKey::step_success(&step),
            ConditionStatus::False,
            format!("Rejected: {cause}"),
        ) {
            self.store().update(run)?;
        }

        job.status.conditions.set(
            ConditionKey::JobCreated,
            ConditionStatus::False,
            cause.to_string(),
        );
        job.status.conditions.set(
            ConditionKey::JobSucceeded,
            ConditionStatus::False,
            cause.to_string(),
        );
        job.status.state = Some(format!("Rejected ({cause})"));
        self.store().update(job)?;
        Ok(PassOutcome::Acted(Action::WorkloadRejected))
    }

    /// Mirror `observed` into the run ledger first, then the job's ledger.
    ///
    /// A step the run already considers finished keeps its verdict.
    fn propagate(
        &self,
        job: &mut PipelineJob,
        run: &mut PipelineRun,
        observed: ConditionStatus,
    ) -> Result<PassOutcome> {
        let step = job.spec.step_id.clone();
        let status = match run.step_status(&step) {
            Some(done @ (ConditionStatus::True | ConditionStatus::False)) => done,
            _ => observed,
        };

        let mut changed = false;
        if run.status.conditions.set(
            ConditionKey::step_success(&step),
            status,
            format!("Step {step}: {}", state_for(status)),
        ) {
            self.store().update(run)?;
            info!(run = %run.name(), %step, %status, "propagated step status");
            changed = true;
        }

        let job_changed = job.status.conditions.set(
            ConditionKey::JobSucceeded,
            status,
            state_for(status),
        );
        if job_changed || job.status.state.as_deref() != Some(state_for(status)) {
            job.status.state = Some(state_for(status).to_string());
            self.store().update(job)?;
            changed = true;
        }

        if changed {
            Ok(PassOutcome::Acted(Action::StepStatusPropagated))
        } else {
            Ok(PassOutcome::Idle)
        }
    }
}
