// src/dag/scheduler.rs

use tracing::debug;

use crate::api::{PipelineRun, RunOutcome, StepSpec};
use crate::dag::graph::PipeGraph;
use crate::status::{ConditionStatus, StepCounts};

/// Read-only scheduling view over one run.
///
/// Pairs the run's frozen structure snapshot with its ledger and answers
/// the questions every phase of the run state machine asks:
/// - which step may start next
/// - which step's output volume may be reclaimed next
/// - what the run's terminal outcome is
///
/// Nothing here mutates state; callers act on the answers and persist the
/// result through the ledger.
#[derive(Debug, Clone)]
pub struct Scheduler<'a> {
    run: &'a PipelineRun,
    graph: PipeGraph<'a>,
}

impl<'a> Scheduler<'a> {
    /// Build a view for `run`, or `None` if no structure snapshot exists yet.
    pub fn for_run(run: &'a PipelineRun) -> Option<Self> {
        let structure = run.status.structure.as_ref()?;
        Some(Self {
            run,
            graph: PipeGraph::new(structure),
        })
    }

    pub fn graph(&self) -> &PipeGraph<'a> {
        &self.graph
    }

    /// Every pipe targeting `step` has a source step that succeeded.
    ///
    /// Vacuously true for steps without inputs.
    pub fn all_inputs_succeeded(&self, step: &str) -> bool {
        self.graph
            .inputs_of(step)
            .all(|pipe| self.run.has_succeeded(&pipe.from.step_id))
    }

    /// Every pipe leaving `step` has a target step that succeeded.
    ///
    /// Vacuously true for steps without outputs.
    pub fn all_outputs_succeeded(&self, step: &str) -> bool {
        self.graph
            .outputs_of(step)
            .all(|pipe| self.run.has_succeeded(&pipe.to.step_id))
    }

    /// First step, in definition order, that is not active yet and whose
    /// inputs have all succeeded.
    pub fn startable_step(&self) -> Option<&'a StepSpec> {
        let step = self
            .graph
            .steps()
            .find(|s| !self.run.is_active(&s.id) && self.all_inputs_succeeded(&s.id));
        if let Some(s) = step {
            debug!(run = %self.run.name(), step = %s.id, "found startable step");
        }
        step
    }

    /// First step, in definition order, whose output volume still exists
    /// although the step and all of its consumers have succeeded.
    pub fn reclaimable_step(&self) -> Option<&'a StepSpec> {
        self.graph.steps().find(|s| {
            self.run.has_volume(&s.id)
                && self.run.has_succeeded(&s.id)
                && self.all_outputs_succeeded(&s.id)
        })
    }

    /// Steps currently marked active (`success-<step>` unknown).
    pub fn active_steps(&self) -> impl Iterator<Item = &'a StepSpec> + '_ {
        self.graph
            .steps()
            .filter(|s| self.run.step_status(&s.id) == Some(ConditionStatus::Unknown))
    }

    /// Counts over the steps of the snapshot.
    pub fn step_counts(&self) -> StepCounts {
        self.run.status.conditions.step_counts()
    }

    /// Terminal outcome implied by the ledger.
    ///
    /// `Failed` if any step failed, which takes precedence; `Succeeded` if
    /// every step succeeded; `None` while the run is still in progress.
    pub fn outcome(&self) -> Option<RunOutcome> {
        let mut all_succeeded = true;
        for step in self.graph.steps() {
            match self.run.step_status(&step.id) {
                Some(ConditionStatus::False) => return Some(RunOutcome::Failed),
                Some(ConditionStatus::True) => {}
                Some(ConditionStatus::Unknown) | None => all_succeeded = false,
            }
        }
        if all_succeeded {
            Some(RunOutcome::Succeeded)
        } else {
            None
        }
    }
}
