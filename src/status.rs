// src/status.rs

//! Status ledger shared by runs and units of work.
//!
//! A [`Ledger`] maps typed [`ConditionKey`]s to tri-state
//! [`ConditionStatus`] values. Every phase of the engine reads and writes
//! progress exclusively through it, and every write goes through
//! [`Ledger::set`], which is a no-op when the condition already holds the
//! requested status. That no-op is what makes repeated or reordered
//! reconcile passes commute.
//!
//! On the wire keys keep their historical string form (`success-<step>`,
//! `pvc-<step>`, `VersionDetermined`, ...), so a serialized ledger reads the
//! same way an operator would see it in a status dump.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix of the per-step success condition.
pub const STEP_SUCCESS_PREFIX: &str = "success-";
/// Prefix of the per-step output volume condition.
pub const VOLUME_PREFIX: &str = "pvc-";

/// Name of a condition in a [`Ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ConditionKey {
    /// Run: the concrete definition version has been chosen.
    VersionDetermined,
    /// Run: the frozen structure snapshot has been taken.
    StructureLoaded,
    /// Run: externally paused; no new steps are scheduled.
    Paused,
    /// Run: externally terminated; no new steps are scheduled.
    Terminated,
    /// Run: terminal outcome is success.
    Succeeded,
    /// Run: terminal outcome is failure.
    Failed,
    /// Unit of work: the workload was submitted to the executor.
    JobCreated,
    /// Unit of work: mirror of the workload's terminal status.
    JobSucceeded,
    /// Run: `success-<step>`. Absent = not started, unknown = active.
    StepSuccess(String),
    /// Run: `pvc-<step>`, true while the step's output volume exists.
    Volume(String),
}

impl ConditionKey {
    pub fn step_success(step: impl Into<String>) -> Self {
        ConditionKey::StepSuccess(step.into())
    }

    pub fn volume(step: impl Into<String>) -> Self {
        ConditionKey::Volume(step.into())
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionKey::VersionDetermined => f.write_str("VersionDetermined"),
            ConditionKey::StructureLoaded => f.write_str("StructureLoaded"),
            ConditionKey::Paused => f.write_str("Paused"),
            ConditionKey::Terminated => f.write_str("Terminated"),
            ConditionKey::Succeeded => f.write_str("Succeeded"),
            ConditionKey::Failed => f.write_str("Failed"),
            ConditionKey::JobCreated => f.write_str("JobCreated"),
            ConditionKey::JobSucceeded => f.write_str("JobSucceeded"),
            ConditionKey::StepSuccess(step) => write!(f, "{STEP_SUCCESS_PREFIX}{step}"),
            ConditionKey::Volume(step) => write!(f, "{VOLUME_PREFIX}{step}"),
        }
    }
}

impl FromStr for ConditionKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s {
            "VersionDetermined" => ConditionKey::VersionDetermined,
            "StructureLoaded" => ConditionKey::StructureLoaded,
            "Paused" => ConditionKey::Paused,
            "Terminated" => ConditionKey::Terminated,
            "Succeeded" => ConditionKey::Succeeded,
            "Failed" => ConditionKey::Failed,
            "JobCreated" => ConditionKey::JobCreated,
            "JobSucceeded" => ConditionKey::JobSucceeded,
            other => {
                if let Some(step) = other.strip_prefix(STEP_SUCCESS_PREFIX) {
                    ConditionKey::StepSuccess(step.to_string())
                } else if let Some(step) = other.strip_prefix(VOLUME_PREFIX) {
                    ConditionKey::Volume(step.to_string())
                } else {
                    return Err(format!("unknown condition type: {other}"));
                }
            }
        };
        Ok(key)
    }
}

impl From<ConditionKey> for String {
    fn from(key: ConditionKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for ConditionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Tri-state value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    Unknown,
    True,
    False,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionStatus::Unknown => "Unknown",
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
        };
        f.write_str(s)
    }
}

/// One entry of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Step counters derived from the `success-*` conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub active: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for StepCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.active, self.succeeded, self.failed)
    }
}

/// Typed, mergeable set of conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    conditions: BTreeMap<ConditionKey, Condition>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ConditionKey) -> Option<&Condition> {
        self.conditions.get(key)
    }

    pub fn status(&self, key: &ConditionKey) -> Option<ConditionStatus> {
        self.conditions.get(key).map(|c| c.status)
    }

    pub fn is_present(&self, key: &ConditionKey) -> bool {
        self.conditions.contains_key(key)
    }

    pub fn is_true(&self, key: &ConditionKey) -> bool {
        self.status(key) == Some(ConditionStatus::True)
    }

    /// Compare-and-set.
    ///
    /// Returns `false` (and leaves the ledger untouched) if `key` already
    /// holds `status`; otherwise records the new status and message and
    /// returns `true`. Callers persist the owning record only when this
    /// returns `true`.
    pub fn set(
        &mut self,
        key: ConditionKey,
        status: ConditionStatus,
        message: impl Into<String>,
    ) -> bool {
        if self.status(&key) == Some(status) {
            return false;
        }
        self.conditions.insert(
            key,
            Condition {
                status,
                reason: "Reconciling".to_string(),
                message: message.into(),
            },
        );
        true
    }

    /// Merge `other` into `self`, `other` winning on every key it holds.
    ///
    /// Returns `true` if anything changed.
    pub fn merge(&mut self, other: &Ledger) -> bool {
        let mut changed = false;
        for (key, cond) in &other.conditions {
            changed |= self.set(key.clone(), cond.status, cond.message.clone());
        }
        changed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ConditionKey, &Condition)> {
        self.conditions.iter()
    }

    /// Count `success-*` conditions per status.
    pub fn step_counts(&self) -> StepCounts {
        let mut counts = StepCounts::default();
        for (key, cond) in &self.conditions {
            if let ConditionKey::StepSuccess(_) = key {
                match cond.status {
                    ConditionStatus::Unknown => counts.active += 1,
                    ConditionStatus::True => counts.succeeded += 1,
                    ConditionStatus::False => counts.failed += 1,
                }
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
