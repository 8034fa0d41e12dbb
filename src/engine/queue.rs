// src/engine/queue.rs

use std::collections::{HashSet, VecDeque};

use tracing::trace;

use crate::api::{Kind, ObjectKey, Record};

/// A request to reconcile one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub kind: Kind,
    pub key: ObjectKey,
}

impl WorkItem {
    pub fn new(kind: Kind, key: ObjectKey) -> Self {
        Self { kind, key }
    }

    pub fn of<R: Record>(record: &R) -> Self {
        Self::new(R::KIND, record.key())
    }
}

/// FIFO of reconcile requests that coalesces duplicates.
///
/// Notifications are at-least-once and may arrive in bursts; a record that
/// is already waiting is not queued a second time, since one pass observes
/// all changes made so far.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
    queued: HashSet<WorkItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the item was already queued.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if !self.queued.insert(item.clone()) {
            trace!(kind = %item.kind, key = %item.key, "reconcile request coalesced");
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = WorkItem>) {
        for item in items {
            self.push(item);
        }
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        let item = self.items.pop_front()?;
        self.queued.remove(&item);
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
