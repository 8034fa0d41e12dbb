// src/engine/mod.rs

//! Reconciliation engine.
//!
//! This module ties together:
//! - the run state machine ([`run_controller`])
//! - the unit-of-work reconciler ([`job_controller`])
//! - per-step configuration delivery and service account provisioning
//!   ([`definition_controller`])
//! - the volume lifecycle ([`volumes`]) and version policy ([`version`])
//! - the async runtime that re-invokes reconcilers on store changes,
//!   workload completions and a periodic resync ([`runtime`])
//!
//! Every reconcile call is a single synchronous pass over current store
//! state that performs at most one state-advancing action and reports it as
//! a [`PassOutcome`]. Callers re-invoke until the pass is idle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::api::{Kind, ObjectKey, PipelineRun, RunOutcome};
use crate::errors::Result;
use crate::exec::{WorkloadExecutor, WorkloadPhase};
use crate::store::{Change, Store};

pub mod definition_controller;
pub mod events;
pub mod job_controller;
pub mod queue;
pub mod run_controller;
pub mod runtime;
pub mod version;
pub mod volumes;

pub use events::{Event, EventRecorder, Severity};
pub use queue::{WorkItem, WorkQueue};
pub use runtime::Runtime;
pub use version::{PatternVersionResolver, VersionResolver};

/// Events flowing into the runtime from the store, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A record was created, updated or deleted.
    RecordChanged {
        kind: Kind,
        key: ObjectKey,
        change: Change,
    },
    /// A workload reached a terminal phase. `job` names the unit of work.
    WorkloadFinished { job: ObjectKey, phase: WorkloadPhase },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// The state-advancing action a pass performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    VersionResolved(String),
    StructureLoaded,
    StepScheduled(String),
    /// A step was active but its unit of work was missing.
    JobRecreated(String),
    VolumeReclaimed(String),
    StatisticsUpdated,
    OutcomeRecorded(RunOutcome),
    WorkloadSubmitted,
    WorkloadRejected,
    StepStatusPropagated,
    ConfigDelivered,
    ServiceAccountCreated(String),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::VersionResolved(v) => write!(f, "version resolved ({v})"),
            Action::StructureLoaded => f.write_str("structure loaded"),
            Action::StepScheduled(s) => write!(f, "step {s} scheduled"),
            Action::JobRecreated(s) => write!(f, "unit of work for {s} recreated"),
            Action::VolumeReclaimed(s) => write!(f, "volume of {s} reclaimed"),
            Action::StatisticsUpdated => f.write_str("statistics updated"),
            Action::OutcomeRecorded(o) => write!(f, "outcome recorded ({o})"),
            Action::WorkloadSubmitted => f.write_str("workload submitted"),
            Action::WorkloadRejected => f.write_str("workload rejected"),
            Action::StepStatusPropagated => f.write_str("step status propagated"),
            Action::ConfigDelivered => f.write_str("step config delivered"),
            Action::ServiceAccountCreated(s) => write!(f, "service account {s} created"),
        }
    }
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The record no longer exists.
    Missing,
    /// Nothing left to do until something changes.
    Idle,
    Acted(Action),
}

impl PassOutcome {
    pub fn acted(&self) -> bool {
        matches!(self, PassOutcome::Acted(_))
    }
}

/// Operator-wide settings shared by all reconcilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub namespace: String,
    /// Claim size for steps that do not declare one.
    pub volume_size_gb: u64,
    pub storage_class: String,
    /// Annotation key binding a provisioned service account to a cloud
    /// IAM principal.
    pub iam_annotation: String,
    /// Principal template; `{name}` and `{namespace}` are substituted.
    pub iam_principal: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            volume_size_gb: 10,
            storage_class: "standard".to_string(),
            iam_annotation: DEFAULT_IAM_ANNOTATION.to_string(),
            iam_principal: DEFAULT_IAM_PRINCIPAL.to_string(),
        }
    }
}

pub const DEFAULT_IAM_ANNOTATION: &str = "iam.gke.io/gcp-service-account";
pub const DEFAULT_IAM_PRINCIPAL: &str = "{name}@{namespace}.iam.gserviceaccount.com";

/// Runtime options for the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Exit once every run is settled (used for `--once`).
    pub exit_when_settled: bool,
    pub resync_interval: Duration,
}

/// Shared collaborators of all reconcilers.
pub struct Engine<S, E> {
    store: Arc<S>,
    executor: Arc<E>,
    resolver: Box<dyn VersionResolver>,
    events: EventRecorder,
    settings: EngineSettings,
}

impl<S, E> fmt::Debug for Engine<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S: Store, E: WorkloadExecutor> Engine<S, E> {
    pub fn new(store: Arc<S>, executor: Arc<E>, settings: EngineSettings) -> Self {
        Self {
            store,
            executor,
            resolver: Box::new(PatternVersionResolver::default()),
            events: EventRecorder::default(),
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn VersionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn executor(&self) -> &Arc<E> {
        &self.executor
    }

    pub fn events(&self) -> &EventRecorder {
        &self.events
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one pass of the reconciler responsible for `item`.
    pub fn reconcile(&self, item: &WorkItem) -> Result<PassOutcome> {
        match item.kind {
            Kind::PipelineDefinition => self.reconcile_definition(&item.key),
            Kind::PipelineRun => self.reconcile_run(&item.key),
            Kind::PipelineJob => self.reconcile_job(&item.key),
            Kind::VolumeClaim | Kind::StepConfig | Kind::ServiceAccount => Ok(PassOutcome::Idle),
        }
    }

    /// Every record the reconcilers care about, definitions first.
    pub fn resync_items(&self) -> Result<Vec<WorkItem>> {
        let ns = &self.settings.namespace;
        let mut items = Vec::new();
        for def in self.store.list::<crate::api::PipelineDefinition>(ns)? {
            items.push(WorkItem::of(&def));
        }
        for run in self.store.list::<PipelineRun>(ns)? {
            items.push(WorkItem::of(&run));
        }
        for job in self.store.list::<crate::api::PipelineJob>(ns)? {
            items.push(WorkItem::of(&job));
        }
        Ok(items)
    }

    /// Whether no run can make further progress on its own: none has an
    /// active step, and each is halted or has a terminal outcome with no
    /// step left to start.
    pub fn all_runs_settled(&self) -> Result<bool> {
        let runs = self.store.list::<PipelineRun>(&self.settings.namespace)?;
        Ok(runs.iter().all(|run| {
            let idle = run.status.conditions.step_counts().active == 0;
            let drained = crate::dag::Scheduler::for_run(run)
                .is_none_or(|s| s.startable_step().is_none());
            (run.is_settled() && drained) || (run.is_halted() && idle)
        }))
    }
}
