// src/api/volume.rs

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Output volume claim of one step in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaim {
    pub metadata: ObjectMeta,
    pub spec: VolumeClaimSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaimSpec {
    pub size_gb: u64,
    pub storage_class: String,
    pub access_modes: Vec<AccessMode>,
}

/// Written once by the producer, read by any number of consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
}
