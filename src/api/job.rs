// src/api/job.rs

//! The unit of work: one record per scheduled step per run.

use serde::{Deserialize, Serialize};

use super::definition::JobTemplate;
use super::ObjectMeta;
use crate::status::Ledger;

/// Created once per step per run and never updated in place: if its spec has
/// to change it is deleted and recreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub metadata: ObjectMeta,
    pub spec: PipelineJobSpec,
    #[serde(default)]
    pub status: PipelineJobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineJobSpec {
    pub pipeline_run: String,
    pub pipeline_definition: String,
    pub step_id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// One binding per input pipe, in pipe order.
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    pub job: JobTemplate,
}

/// A resolved input pipe: where the upstream file is mounted and the name
/// the step expects it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    pub volume: String,
    pub mount_path: String,
    pub source_file: String,
    pub target_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineJobStatus {
    #[serde(default)]
    pub conditions: Ledger,
    #[serde(default)]
    pub state: Option<String>,
}
