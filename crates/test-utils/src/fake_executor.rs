use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use pipeline_operator::api::ObjectKey;
use pipeline_operator::engine::RuntimeEvent;
use pipeline_operator::exec::{ExecutorError, WorkloadExecutor, WorkloadPhase};
use pipeline_operator::materialize::WorkloadDescriptor;

#[derive(Debug, Default)]
struct State {
    workloads: BTreeMap<String, (WorkloadDescriptor, WorkloadPhase)>,
    submitted: Vec<String>,
    deleted: Vec<String>,
    released: Vec<String>,
    rejected: BTreeSet<String>,
    unavailable: usize,
}

/// A fake executor that:
/// - records every submission, deletion and volume release
/// - keeps workloads `Running` until the test finishes them
/// - optionally reports completions to a runtime channel
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    state: Arc<Mutex<State>>,
    runtime_tx: Option<mpsc::UnboundedSender<RuntimeEvent>>,
    /// Finish every workload with this phase as soon as it is submitted.
    auto_finish: Option<WorkloadPhase>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notifier(runtime_tx: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
        Self {
            state: Arc::default(),
            runtime_tx: Some(runtime_tx),
            auto_finish: None,
        }
    }

    /// Every submitted workload finishes immediately with `phase`, and the
    /// completion is reported on `runtime_tx`.
    pub fn auto_finishing(
        runtime_tx: mpsc::UnboundedSender<RuntimeEvent>,
        phase: WorkloadPhase,
    ) -> Self {
        Self {
            auto_finish: Some(phase),
            ..Self::with_notifier(runtime_tx)
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Move a workload to a terminal phase.
    pub fn finish(&self, name: &str, phase: WorkloadPhase) {
        let namespace = {
            let mut state = self.lock();
            let entry = state
                .workloads
                .get_mut(name)
                .unwrap_or_else(|| panic!("workload {name} was never submitted"));
            entry.1 = phase;
            entry.0.namespace.clone()
        };
        if let Some(tx) = &self.runtime_tx {
            let _ = tx.send(RuntimeEvent::WorkloadFinished {
                job: ObjectKey::new(namespace, name),
                phase,
            });
        }
    }

    pub fn succeed(&self, name: &str) {
        self.finish(name, WorkloadPhase::Succeeded);
    }

    pub fn fail(&self, name: &str) {
        self.finish(name, WorkloadPhase::Failed);
    }

    /// Make the next submission of `name` fail with a rejection.
    pub fn reject(&self, name: &str) {
        self.lock().rejected.insert(name.to_string());
    }

    /// Make the next `count` calls fail as unavailable.
    pub fn make_unavailable(&self, count: usize) {
        self.lock().unavailable = count;
    }

    /// Drop a workload without recording a deletion, as if the platform
    /// lost it.
    pub fn forget(&self, name: &str) {
        self.lock().workloads.remove(name);
    }

    /// Names in submission order, including resubmissions.
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.lock().released.clone()
    }

    pub fn descriptor(&self, name: &str) -> Option<WorkloadDescriptor> {
        self.lock().workloads.get(name).map(|(d, _)| d.clone())
    }

    pub fn running(&self) -> Vec<String> {
        self.lock()
            .workloads
            .iter()
            .filter(|(_, (_, phase))| *phase == WorkloadPhase::Running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn check_available(state: &mut State) -> Result<(), ExecutorError> {
        if state.unavailable > 0 {
            state.unavailable -= 1;
            return Err(ExecutorError::Unavailable("fake executor offline".to_string()));
        }
        Ok(())
    }
}

impl WorkloadExecutor for FakeExecutor {
    fn submit(&self, workload: &WorkloadDescriptor) -> Result<String, ExecutorError> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;
        if state.rejected.remove(&workload.name) {
            return Err(ExecutorError::Rejected {
                name: workload.name.clone(),
                reason: "rejected by fake executor".to_string(),
            });
        }
        if state.workloads.contains_key(&workload.name) {
            return Err(ExecutorError::AlreadyExists(workload.name.clone()));
        }
        state.submitted.push(workload.name.clone());
        state
            .workloads
            .insert(workload.name.clone(), (workload.clone(), WorkloadPhase::Running));
        drop(state);

        if let Some(phase) = self.auto_finish {
            self.finish(&workload.name, phase);
        }
        Ok(workload.name.clone())
    }

    fn phase(&self, name: &str) -> Result<Option<WorkloadPhase>, ExecutorError> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;
        Ok(state.workloads.get(name).map(|(_, phase)| *phase))
    }

    fn delete(&self, name: &str) -> Result<bool, ExecutorError> {
        let mut state = self.lock();
        Self::check_available(&mut state)?;
        let existed = state.workloads.remove(name).is_some();
        if existed {
            state.deleted.push(name.to_string());
        }
        Ok(existed)
    }

    fn release_volume(&self, claim: &str) -> Result<(), ExecutorError> {
        self.lock().released.push(claim.to_string());
        Ok(())
    }
}
