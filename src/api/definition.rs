// src/api/definition.rs

//! Pipeline definitions: a named, versioned graph of steps and pipes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Immutable once versioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub metadata: ObjectMeta,
    pub spec: PipelineDefinitionSpec,
}

impl PipelineDefinition {
    /// Store name of the definition of `pipeline` at `version`.
    pub fn object_name(pipeline: &str, version: &str) -> String {
        format!("{pipeline}-{version}")
    }

    pub fn new(namespace: impl Into<String>, spec: PipelineDefinitionSpec) -> Self {
        let name = Self::object_name(&spec.name, &spec.version);
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinitionSpec {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub structure: PipelineStructure,
}

/// Steps and pipes that constitute a pipeline.
///
/// Steps keep their definition order; every "first match" decision of the
/// engine scans them in this order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStructure {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub pipes: Vec<Pipe>,
}

impl PipelineStructure {
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Deep copy with every per-step configuration blob stripped.
    ///
    /// This is the frozen snapshot stored in a run's status; configuration is
    /// delivered to workloads separately.
    pub fn snapshot(&self) -> PipelineStructure {
        let mut copy = self.clone();
        for step in &mut copy.steps {
            step.config = None;
        }
        copy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique within the definition.
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Declared input names; empty means "not declared".
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Free-form configuration, delivered as `config.json`.
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    pub job: JobTemplate,
}

/// Workload template of a step. Limits are applied verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    #[serde(default)]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub termination_grace_period_seconds: Option<i64>,
    #[serde(default)]
    pub ttl_seconds_after_finished: Option<i32>,
    #[serde(default)]
    pub backoff_limit: Option<i32>,
    #[serde(default)]
    pub service_account_name: Option<String>,
    /// Size of the step's output volume; falls back to the operator default.
    #[serde(default)]
    pub volume_size_gb: Option<u64>,
}

/// `(fromStep, fromFile) -> (toStep, toFile)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipe {
    pub from: PipeEnd,
    pub to: PipeEnd,
}

impl Pipe {
    pub fn new(from: PipeEnd, to: PipeEnd) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// One end of a pipe: a step and a file name at that step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeEnd {
    pub step_id: String,
    pub name: String,
}

impl PipeEnd {
    pub fn new(step_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PipeEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.step_id, self.name)
    }
}

/// Parses `"<step>:<file>"`.
impl FromStr for PipeEnd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (step, name) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("invalid pipe end '{s}' (expected \"<step>:<file>\")"))?;
        if step.is_empty() || name.is_empty() {
            return Err(format!(
                "invalid pipe end '{s}': step and file name must both be non-empty"
            ));
        }
        Ok(PipeEnd::new(step, name))
    }
}
