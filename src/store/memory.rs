// src/store/memory.rs

//! In-memory implementation of [`Store`].
//!
//! Records are kept as JSON documents, so every read returns a fresh deep
//! copy and no caller can alias another caller's state.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::api::{Kind, ObjectKey, ObjectMeta, Record};
use crate::engine::RuntimeEvent;

use super::{Change, Store, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    meta: ObjectMeta,
    value: serde_json::Value,
}

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<(Kind, ObjectKey), Entry>,
    next_version: u64,
    /// Remaining injected write failures per kind.
    faults: HashMap<Kind, usize>,
}

/// Thread-safe in-memory store with optimistic concurrency and owner
/// cascade.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    notifier: Option<mpsc::UnboundedSender<RuntimeEvent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that announces every change on `tx`.
    pub fn with_notifier(tx: mpsc::UnboundedSender<RuntimeEvent>) -> Self {
        Self {
            inner: Mutex::default(),
            notifier: Some(tx),
        }
    }

    /// Make the next `count` writes (create/update/delete) of `kind` fail
    /// with [`StoreError::Unavailable`].
    pub fn inject_write_failures(&self, kind: Kind, count: usize) {
        self.lock().faults.insert(kind, count);
    }

    /// Number of records of `kind` across all namespaces.
    pub fn count(&self, kind: Kind) -> usize {
        self.lock().records.keys().filter(|(k, _)| *k == kind).count()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, kind: Kind, key: ObjectKey, change: Change) {
        trace!(%kind, %key, ?change, "store change");
        if let Some(tx) = &self.notifier {
            // A closed channel only means nobody is watching any more.
            let _ = tx.send(RuntimeEvent::RecordChanged { kind, key, change });
        }
    }

    fn encode<R: Record>(record: &R) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(record).map_err(|e| StoreError::Serialization {
            kind: R::KIND,
            key: record.key(),
            message: e.to_string(),
        })
    }

    fn decode<R: Record>(key: &ObjectKey, entry: &Entry) -> Result<R, StoreError> {
        serde_json::from_value(entry.value.clone()).map_err(|e| StoreError::Serialization {
            kind: R::KIND,
            key: key.clone(),
            message: e.to_string(),
        })
    }

    fn take_fault(inner: &mut Inner, kind: Kind) -> Result<(), StoreError> {
        if let Some(remaining) = inner.faults.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!(
                    "injected write failure for {kind}"
                )));
            }
        }
        Ok(())
    }

    fn write_entry<R: Record>(inner: &mut Inner, record: &R) -> Result<R, StoreError> {
        inner.next_version += 1;
        let mut stored = record.clone();
        stored.metadata_mut().resource_version = inner.next_version;
        let value = Self::encode(&stored)?;
        inner.records.insert(
            (R::KIND, stored.key()),
            Entry {
                meta: stored.metadata().clone(),
                value,
            },
        );
        Ok(stored)
    }
}

impl Store for MemoryStore {
    fn get<R: Record>(&self, key: &ObjectKey) -> Result<Option<R>, StoreError> {
        let inner = self.lock();
        inner
            .records
            .get(&(R::KIND, key.clone()))
            .map(|entry| Self::decode(key, entry))
            .transpose()
    }

    fn list<R: Record>(&self, namespace: &str) -> Result<Vec<R>, StoreError> {
        let inner = self.lock();
        inner
            .records
            .iter()
            .filter(|((kind, key), _)| *kind == R::KIND && key.namespace == namespace)
            .map(|((_, key), entry)| Self::decode(key, entry))
            .collect()
    }

    fn create<R: Record>(&self, record: &R) -> Result<R, StoreError> {
        let key = record.key();
        let stored = {
            let mut inner = self.lock();
            Self::take_fault(&mut inner, R::KIND)?;
            if inner.records.contains_key(&(R::KIND, key.clone())) {
                return Err(StoreError::AlreadyExists { kind: R::KIND, key });
            }
            Self::write_entry(&mut inner, record)?
        };
        debug!(kind = %R::KIND, %key, version = stored.metadata().resource_version, "created record");
        self.notify(R::KIND, key, Change::Created);
        Ok(stored)
    }

    fn update<R: Record>(&self, record: &R) -> Result<R, StoreError> {
        let key = record.key();
        let stored = {
            let mut inner = self.lock();
            Self::take_fault(&mut inner, R::KIND)?;
            let actual = match inner.records.get(&(R::KIND, key.clone())) {
                Some(entry) => entry.meta.resource_version,
                None => return Err(StoreError::NotFound { kind: R::KIND, key }),
            };
            let expected = record.metadata().resource_version;
            if expected != actual {
                return Err(StoreError::Conflict {
                    kind: R::KIND,
                    key,
                    expected,
                    actual,
                });
            }
            Self::write_entry(&mut inner, record)?
        };
        debug!(kind = %R::KIND, %key, version = stored.metadata().resource_version, "updated record");
        self.notify(R::KIND, key, Change::Updated);
        Ok(stored)
    }

    fn delete<R: Record>(&self, key: &ObjectKey) -> Result<bool, StoreError> {
        let removed = {
            let mut inner = self.lock();
            Self::take_fault(&mut inner, R::KIND)?;
            if !inner.records.contains_key(&(R::KIND, key.clone())) {
                return Ok(false);
            }

            // Collect the record and everything it (transitively) owns.
            let mut removed = Vec::new();
            let mut stack = vec![(R::KIND, key.clone())];
            while let Some((kind, k)) = stack.pop() {
                if inner.records.remove(&(kind, k.clone())).is_none() {
                    continue;
                }
                for ((child_kind, child_key), entry) in inner.records.iter() {
                    let owned = entry.meta.owner.as_ref().is_some_and(|o| {
                        o.kind == kind && o.name == k.name && child_key.namespace == k.namespace
                    });
                    if owned {
                        stack.push((*child_kind, child_key.clone()));
                    }
                }
                removed.push((kind, k));
            }
            removed
        };

        for (kind, k) in removed {
            debug!(%kind, key = %k, "deleted record");
            self.notify(kind, k, Change::Deleted);
        }
        Ok(true)
    }
}
