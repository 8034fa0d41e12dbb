// src/api/mod.rs

//! Typed records persisted in the data store.
//!
//! - [`definition`]: immutable, versioned pipeline graphs.
//! - [`run`]: one execution of a definition with its status ledger.
//! - [`job`]: the unit of work created for one step of one run.
//! - [`volume`]: the output volume claim of one step of one run.
//! - [`step_config`]: per-step configuration documents of a definition.
//! - [`service_account`]: workload identities provisioned for a definition.
//!
//! Every record carries an [`ObjectMeta`] with a store-assigned
//! `resource_version` used for optimistic concurrency, and an optional
//! [`OwnerRef`] the store follows when cascading deletes.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod definition;
pub mod job;
pub mod run;
pub mod service_account;
pub mod step_config;
pub mod volume;

pub use definition::{JobTemplate, Pipe, PipeEnd, PipelineDefinition, PipelineDefinitionSpec, PipelineStructure, StepSpec};
pub use job::{InputBinding, PipelineJob, PipelineJobSpec, PipelineJobStatus};
pub use run::{PipelineRun, PipelineRunSpec, PipelineRunStatus, RunOutcome};
pub use service_account::ServiceAccount;
pub use step_config::StepConfig;
pub use volume::{AccessMode, VolumeClaim, VolumeClaimSpec};

/// Label keys attached to every derived record and workload.
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

const PART_OF: &str = "pipeline-operator";
const MANAGED_BY: &str = "pipeline-operator-controller";

/// Record kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    PipelineDefinition,
    PipelineRun,
    PipelineJob,
    VolumeClaim,
    StepConfig,
    ServiceAccount,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `(namespace, name)` identity of a record within one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Back-reference from a derived record to the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: Kind,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Assigned by the store on every successful write; `0` means "never
    /// written".
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Declare `owner` as the controlling owner; deleting it cascades here.
    pub fn owned_by<R: Record>(mut self, owner: &R) -> Self {
        self.owner = Some(OwnerRef {
            kind: R::KIND,
            name: owner.metadata().name.clone(),
        });
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Standard labels for a derived record.
pub fn standard_labels(component: &str, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), component.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_PART_OF.to_string(), PART_OF.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

/// A typed record the store can persist.
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: Kind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl $crate::api::Record for $ty {
            const KIND: $crate::api::Kind = $kind;

            fn metadata(&self) -> &$crate::api::ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut $crate::api::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

impl_record!(PipelineDefinition, Kind::PipelineDefinition);
impl_record!(PipelineRun, Kind::PipelineRun);
impl_record!(PipelineJob, Kind::PipelineJob);
impl_record!(VolumeClaim, Kind::VolumeClaim);
impl_record!(StepConfig, Kind::StepConfig);
impl_record!(ServiceAccount, Kind::ServiceAccount);
