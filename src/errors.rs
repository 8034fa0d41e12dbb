// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::exec::ExecutorError;
use crate::materialize::MaterializeError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Cycle detected in pipeline: {0}")]
    DagCycle(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Materialization error: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("No such pipeline definition: {0}")]
    DefinitionNotFound(String),

    /// A state the engine should never observe (e.g. scheduling without a
    /// structure snapshot). The pass is aborted and retried.
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OperatorError {
    /// Whether this error came from an optimistic-concurrency rejection.
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Store(StoreError::Conflict { .. }))
    }
}

pub type Result<T> = std::result::Result<T, OperatorError>;
