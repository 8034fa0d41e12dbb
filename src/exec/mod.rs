// src/exec/mod.rs

//! Workload execution layer.
//!
//! The engine never runs anything itself: it hands a
//! [`WorkloadDescriptor`](crate::materialize::WorkloadDescriptor) to a
//! [`WorkloadExecutor`] and later asks it for the workload's phase.
//!
//! - [`local`] provides [`LocalExecutor`], which runs workloads as local
//!   processes inside per-workload sandbox directories and reports
//!   completion back to the runtime via `RuntimeEvent`s.
//! - Tests replace it with a fake implementation that records submissions
//!   and lets the test decide when and how workloads finish.

use std::fmt;

use thiserror::Error;

use crate::materialize::WorkloadDescriptor;

pub mod local;

pub use local::LocalExecutor;

/// Terminal status reported by the executor, or `Running` until then.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadPhase {
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkloadPhase::Running => "Running",
            WorkloadPhase::Succeeded => "Succeeded",
            WorkloadPhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The executor refuses the descriptor; retrying will not help.
    #[error("workload {name} rejected: {reason}")]
    Rejected { name: String, reason: String },

    /// A workload with this name is already known to the executor.
    #[error("workload {0} already exists")]
    AlreadyExists(String),

    #[error("executor unavailable: {0}")]
    Unavailable(String),

    #[error("executor IO error: {0}")]
    Io(String),
}

impl ExecutorError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExecutorError::Rejected { .. })
    }
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::Io(err.to_string())
    }
}

/// Trait abstracting the platform that runs workloads.
///
/// All methods are synchronous and are expected to return quickly; actual
/// execution happens in the background.
pub trait WorkloadExecutor: Send + Sync {
    /// Start a workload; returns its identifier.
    fn submit(&self, workload: &WorkloadDescriptor) -> Result<String, ExecutorError>;

    /// Current phase of a workload, `Ok(None)` if unknown to the executor.
    fn phase(&self, name: &str) -> Result<Option<WorkloadPhase>, ExecutorError>;

    /// Stop and forget a workload. Returns `false` if it did not exist.
    fn delete(&self, name: &str) -> Result<bool, ExecutorError>;

    /// Release the storage backing a volume claim once the claim is deleted.
    fn release_volume(&self, _claim: &str) -> Result<(), ExecutorError> {
        Ok(())
    }
}
