// src/store/mod.rs

//! Data-store contract consumed by the engine.
//!
//! The engine treats the store as a transactional key-value directory keyed
//! by `(kind, namespace, name)`:
//! - every write is conditioned on the record's `resource_version`, and a
//!   write based on a stale read is rejected with [`StoreError::Conflict`]
//! - deleting a record cascades to every record that names it as owner
//! - every change is announced to the runtime so it can re-invoke the
//!   affected reconcilers
//!
//! [`memory::MemoryStore`] is the in-process implementation used by the
//! binary and the tests.

use thiserror::Error;

use crate::api::{Kind, ObjectKey, Record};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    #[error("conflict writing {kind} {key}: expected version {expected}, found {actual}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("failed to encode {kind} {key}: {message}")]
    Serialization {
        kind: Kind,
        key: ObjectKey,
        message: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Typed access to persisted records.
pub trait Store: Send + Sync {
    /// `Ok(None)` if no such record exists.
    fn get<R: Record>(&self, key: &ObjectKey) -> Result<Option<R>, StoreError>;

    /// All records of kind `R` in `namespace`, ordered by name.
    fn list<R: Record>(&self, namespace: &str) -> Result<Vec<R>, StoreError>;

    /// Create a new record; returns it with its assigned version.
    fn create<R: Record>(&self, record: &R) -> Result<R, StoreError>;

    /// Replace an existing record, provided nobody wrote it since it was
    /// read; returns it with its new version.
    fn update<R: Record>(&self, record: &R) -> Result<R, StoreError>;

    /// Delete a record and, transitively, everything it owns.
    ///
    /// Returns `false` if the record did not exist.
    fn delete<R: Record>(&self, key: &ObjectKey) -> Result<bool, StoreError>;
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Deleted,
}
