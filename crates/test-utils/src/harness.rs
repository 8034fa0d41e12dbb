use std::sync::Arc;

use pipeline_operator::api::{
    Kind, ObjectKey, PipelineDefinition, PipelineJob, PipelineRun, Record, VolumeClaim,
};
use pipeline_operator::engine::{Engine, EngineSettings, PassOutcome, WorkItem};
use pipeline_operator::errors::Result;
use pipeline_operator::exec::WorkloadPhase;
use pipeline_operator::materialize::{job_name, volume_name};
use pipeline_operator::store::{MemoryStore, Store};

use crate::builders::NAMESPACE;
use crate::fake_executor::FakeExecutor;

/// Upper bound on passes in [`Harness::settle`]; hitting it means some
/// reconciler never goes idle.
const MAX_PASSES: usize = 10_000;

/// A `MemoryStore` + `FakeExecutor` engine driven synchronously, pass by
/// pass, without the async runtime.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub executor: Arc<FakeExecutor>,
    pub engine: Engine<MemoryStore, FakeExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let executor = Arc::new(FakeExecutor::new());
        let engine = Engine::new(
            Arc::clone(&store),
            Arc::clone(&executor),
            EngineSettings::default(),
        );
        Self {
            store,
            executor,
            engine,
        }
    }

    pub fn key(name: &str) -> ObjectKey {
        ObjectKey::new(NAMESPACE, name)
    }

    pub fn create<R: Record>(&self, record: &R) -> R {
        self.store.create(record).expect("create record")
    }

    /// Store the definition and reconcile it until idle.
    pub fn add_definition(&self, definition: &PipelineDefinition) {
        self.create(definition);
        while self
            .engine
            .reconcile_definition(&definition.key())
            .expect("reconcile definition")
            .acted()
        {}
    }

    /// One run state machine pass.
    pub fn run_pass(&self, run: &str) -> Result<PassOutcome> {
        self.engine.reconcile_run(&Self::key(run))
    }

    /// One unit-of-work pass for `step` of `run`.
    pub fn job_pass(&self, run: &str, step: &str) -> Result<PassOutcome> {
        self.engine.reconcile_job(&Self::key(&job_name(run, step)))
    }

    /// Reconcile every definition, run and job until no pass acts.
    ///
    /// Returns the number of passes that acted. Errors abort the sweep.
    pub fn settle(&self) -> Result<usize> {
        let mut acted = 0;
        for _ in 0..MAX_PASSES {
            let mut progressed = false;
            for item in self.items()? {
                if self.engine.reconcile(&item)?.acted() {
                    acted += 1;
                    progressed = true;
                }
            }
            if !progressed {
                return Ok(acted);
            }
        }
        panic!("engine did not settle within {MAX_PASSES} sweeps");
    }

    fn items(&self) -> Result<Vec<WorkItem>> {
        let mut items = Vec::new();
        for def in self.store.list::<PipelineDefinition>(NAMESPACE)? {
            items.push(WorkItem::of(&def));
        }
        for run in self.store.list::<PipelineRun>(NAMESPACE)? {
            items.push(WorkItem::of(&run));
        }
        for job in self.store.list::<PipelineJob>(NAMESPACE)? {
            items.push(WorkItem::new(Kind::PipelineJob, job.key()));
        }
        Ok(items)
    }

    /// Finish the workload of `step` and settle.
    pub fn complete(&self, run: &str, step: &str, phase: WorkloadPhase) {
        self.executor.finish(&job_name(run, step), phase);
        self.settle().expect("settle after completion");
    }

    pub fn run(&self, name: &str) -> PipelineRun {
        self.store
            .get::<PipelineRun>(&Self::key(name))
            .expect("get run")
            .unwrap_or_else(|| panic!("run {name} missing"))
    }

    pub fn job(&self, run: &str, step: &str) -> Option<PipelineJob> {
        self.store
            .get::<PipelineJob>(&Self::key(&job_name(run, step)))
            .expect("get job")
    }

    pub fn volume(&self, run: &str, step: &str) -> Option<VolumeClaim> {
        self.store
            .get::<VolumeClaim>(&Self::key(&volume_name(run, step)))
            .expect("get volume")
    }

    /// Steps of `run` that currently have a unit of work, in name order.
    pub fn jobs_of(&self, run: &str) -> Vec<String> {
        self.store
            .list::<PipelineJob>(NAMESPACE)
            .expect("list jobs")
            .into_iter()
            .filter(|j| j.spec.pipeline_run == run)
            .map(|j| j.spec.step_id)
            .collect()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
