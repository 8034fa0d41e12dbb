// src/api/run.rs

//! Pipeline runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::definition::PipelineStructure;
use super::ObjectMeta;
use crate::status::{ConditionKey, ConditionStatus, Ledger, StepCounts};

/// One execution of a pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub metadata: ObjectMeta,
    pub spec: PipelineRunSpec,
    #[serde(default)]
    pub status: PipelineRunStatus,
}

impl PipelineRun {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: PipelineRunSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: PipelineRunStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Store name of the definition this run executes, once the version is
    /// resolved.
    pub fn definition_name(&self) -> Option<String> {
        self.status
            .pipeline_version
            .as_deref()
            .map(|v| super::PipelineDefinition::object_name(&self.spec.pipeline_name, v))
    }

    /// Status of `success-<step>`; `None` = not started.
    pub fn step_status(&self, step: &str) -> Option<ConditionStatus> {
        self.status
            .conditions
            .status(&ConditionKey::step_success(step))
    }

    pub fn is_active(&self, step: &str) -> bool {
        self.step_status(step).is_some()
    }

    pub fn has_succeeded(&self, step: &str) -> bool {
        self.step_status(step) == Some(ConditionStatus::True)
    }

    pub fn has_volume(&self, step: &str) -> bool {
        self.status.conditions.is_true(&ConditionKey::volume(step))
    }

    /// Whether the run has been paused or terminated from outside.
    pub fn is_halted(&self) -> bool {
        self.status.conditions.is_true(&ConditionKey::Paused)
            || self.status.conditions.is_true(&ConditionKey::Terminated)
    }

    /// Terminal outcome recorded and no step still active.
    pub fn is_settled(&self) -> bool {
        self.status.outcome.is_some() && self.status.conditions.step_counts().active == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunSpec {
    pub pipeline_name: String,
    /// Concrete version or `*`-pattern, resolved once per run.
    #[serde(default)]
    pub version_pattern: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub conditions: Ledger,
    #[serde(default)]
    pub pipeline_version: Option<String>,
    /// Frozen, config-free copy of the definition's structure.
    #[serde(default)]
    pub structure: Option<PipelineStructure>,
    /// Human readable current phase.
    #[serde(default)]
    pub phase: Option<String>,
    /// `None` while running.
    #[serde(default)]
    pub outcome: Option<RunOutcome>,
    #[serde(default)]
    pub steps_active: usize,
    #[serde(default)]
    pub steps_succeeded: usize,
    #[serde(default)]
    pub steps_failed: usize,
    #[serde(default)]
    pub steps_total: usize,
}

impl PipelineRunStatus {
    pub fn counts(&self) -> StepCounts {
        StepCounts {
            active: self.steps_active,
            succeeded: self.steps_succeeded,
            failed: self.steps_failed,
        }
    }

    pub fn set_counts(&mut self, counts: StepCounts) {
        self.steps_active = counts.active;
        self.steps_succeeded = counts.succeeded;
        self.steps_failed = counts.failed;
    }
}

/// Terminal outcome of a run; never revisited once recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => f.write_str("Succeeded"),
            RunOutcome::Failed => f.write_str("Failed"),
        }
    }
}
