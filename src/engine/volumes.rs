// src/engine/volumes.rs

//! Volume lifecycle: one output claim per step per run, created before the
//! step is scheduled and reclaimed once every consumer has succeeded.

use tracing::{debug, info};

use crate::api::{
    standard_labels, AccessMode, ObjectKey, ObjectMeta, PipelineJob, PipelineRun, StepSpec,
    VolumeClaim, VolumeClaimSpec,
};
use crate::errors::Result;
use crate::exec::WorkloadExecutor;
use crate::materialize::{job_name, volume_name};
use crate::status::{ConditionKey, ConditionStatus};
use crate::store::{Store, StoreError};

use super::{Engine, EngineSettings};

/// Claim record for the output volume of `step` in `run`.
pub fn volume_claim(run: &PipelineRun, step: &StepSpec, settings: &EngineSettings) -> VolumeClaim {
    let name = volume_name(run.name(), &step.id);
    VolumeClaim {
        metadata: ObjectMeta::new(run.metadata.namespace.clone(), name)
            .owned_by(run)
            .with_labels(standard_labels(&step.id, run.name())),
        spec: VolumeClaimSpec {
            size_gb: step.job.volume_size_gb.unwrap_or(settings.volume_size_gb),
            storage_class: settings.storage_class.clone(),
            access_modes: vec![AccessMode::ReadWriteOnce],
        },
    }
}

impl<S: Store, E: WorkloadExecutor> Engine<S, E> {
    /// Create the output claim of `step` unless it already exists.
    ///
    /// Returns `true` if a claim was created. Recording `pvc-<step>` is left
    /// to the caller, which persists it together with the step's start.
    pub fn ensure_volume(&self, run: &PipelineRun, step: &StepSpec) -> Result<bool> {
        let claim = volume_claim(run, step, self.settings());
        match self.store().create(&claim) {
            Ok(_) => {
                info!(run = %run.name(), step = %step.id, claim = %claim.metadata.name, "created volume claim");
                Ok(true)
            }
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(run = %run.name(), step = %step.id, "volume claim already exists");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the output volume of `step`.
    ///
    /// Deletes the unit of work (and its workload) first so nothing still
    /// binds the volume, then the claim, then records `pvc-<step>=false`.
    /// Each sub-step tolerates having already happened, so an interrupted
    /// reclaim simply continues on the next pass.
    pub fn reclaim_volume(&self, run: &mut PipelineRun, step: &str) -> Result<()> {
        let ns = run.metadata.namespace.clone();
        let job = job_name(run.name(), step);
        let claim = volume_name(run.name(), step);

        self.executor().delete(&job)?;
        if self.store().delete::<PipelineJob>(&ObjectKey::new(ns.clone(), job.clone()))? {
            debug!(run = %run.name(), %step, %job, "deleted unit of work");
        }

        self.executor().release_volume(&claim)?;
        if self.store().delete::<VolumeClaim>(&ObjectKey::new(ns, claim.clone()))? {
            debug!(run = %run.name(), %step, %claim, "deleted volume claim");
        }

        let changed = run.status.conditions.set(
            ConditionKey::volume(step),
            ConditionStatus::False,
            "Volume reclaimed",
        );
        if changed {
            *run = self.store().update(run)?;
        }
        info!(run = %run.name(), %step, %claim, "reclaimed volume");
        Ok(())
    }
}
