// src/engine/events.rs

//! Diagnostic events attached to records.
//!
//! Events are the user-visible trail of what the engine did and why a pass
//! was aborted. Identical consecutive events for the same record are folded
//! into one entry with a count, so a condition retried on every resync does
//! not grow the trail without bound.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::api::{Kind, ObjectKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => f.write_str("Normal"),
            Severity::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: Kind,
    pub object: ObjectKey,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    pub count: u32,
}

/// Cheaply cloneable, shared event sink.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    pub fn record(
        &self,
        kind: Kind,
        object: &ObjectKey,
        severity: Severity,
        reason: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match severity {
            Severity::Normal => info!(%kind, object = %object, reason, "{message}"),
            Severity::Warning => warn!(%kind, object = %object, reason, "{message}"),
        }

        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        let last_for_object = events
            .iter_mut()
            .rev()
            .find(|e| e.kind == kind && &e.object == object);
        if let Some(last) = last_for_object {
            if last.severity == severity && last.reason == reason && last.message == message {
                last.count += 1;
                return;
            }
        }
        events.push(Event {
            kind,
            object: object.clone(),
            severity,
            reason: reason.to_string(),
            message,
            count: 1,
        });
    }

    pub fn normal(&self, kind: Kind, object: &ObjectKey, reason: &str, message: impl Into<String>) {
        self.record(kind, object, Severity::Normal, reason, message);
    }

    pub fn warning(&self, kind: Kind, object: &ObjectKey, reason: &str, message: impl Into<String>) {
        self.record(kind, object, Severity::Warning, reason, message);
    }

    /// Snapshot of all events, oldest first.
    pub fn all(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn for_object(&self, kind: Kind, object: &ObjectKey) -> Vec<Event> {
        self.all()
            .into_iter()
            .filter(|e| e.kind == kind && &e.object == object)
            .collect()
    }
}
