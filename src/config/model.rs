// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::api::{
    JobTemplate, Pipe, PipelineDefinition, PipelineDefinitionSpec, PipelineRun, PipelineRunSpec,
    PipelineStructure, StepSpec,
};
use crate::engine::{EngineSettings, DEFAULT_IAM_ANNOTATION, DEFAULT_IAM_PRINCIPAL};
use crate::errors::{OperatorError, Result};
use crate::status::{ConditionKey, ConditionStatus};

/// Manifest exactly as read from TOML, before validation.
///
/// ```toml
/// [operator]
/// namespace = "default"
///
/// [[definition]]
/// name = "etl"
/// version = "1.0.0"
///
/// [[definition.step]]
/// id = "extract"
/// image = "bash"
/// command = ["sh", "-c", "echo data > output/raw.txt"]
///
/// [[definition.pipe]]
/// from = "extract:raw.txt"
/// to = "load:raw.txt"
///
/// [[run]]
/// name = "etl-1"
/// pipeline = "etl"
/// version = "1.0.0"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawManifest {
    #[serde(default)]
    pub operator: OperatorSection,

    #[serde(default, rename = "definition")]
    pub definitions: Vec<DefinitionConfig>,

    #[serde(default, rename = "run")]
    pub runs: Vec<RunConfig>,
}

/// `[operator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorSection {
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Root of the local executor's volumes and sandboxes.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Duration string (e.g. `"2s"`, `"500ms"`).
    #[serde(default = "default_resync_interval")]
    pub resync_interval: String,

    #[serde(default = "default_volume_size_gb")]
    pub volume_size_gb: u64,

    #[serde(default = "default_storage_class")]
    pub storage_class: String,

    /// Annotation key set on provisioned service accounts.
    #[serde(default = "default_iam_annotation")]
    pub iam_annotation: String,

    /// Annotation value; `{name}` and `{namespace}` are substituted.
    #[serde(default = "default_iam_principal")]
    pub iam_principal: String,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".pipeline-operator")
}

fn default_resync_interval() -> String {
    "2s".to_string()
}

fn default_volume_size_gb() -> u64 {
    10
}

fn default_storage_class() -> String {
    "standard".to_string()
}

fn default_iam_annotation() -> String {
    DEFAULT_IAM_ANNOTATION.to_string()
}

fn default_iam_principal() -> String {
    DEFAULT_IAM_PRINCIPAL.to_string()
}

impl Default for OperatorSection {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            data_dir: default_data_dir(),
            resync_interval: default_resync_interval(),
            volume_size_gb: default_volume_size_gb(),
            storage_class: default_storage_class(),
            iam_annotation: default_iam_annotation(),
            iam_principal: default_iam_principal(),
        }
    }
}

/// `[[definition]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefinitionConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepEntry>,
    #[serde(default, rename = "pipe")]
    pub pipes: Vec<PipeEntry>,
}

/// `[[definition.step]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepEntry {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub image_pull_policy: Option<String>,
    /// Declared input names; when present every input pipe must match one.
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub backoff_limit: Option<i32>,
    #[serde(default)]
    pub active_deadline_seconds: Option<i64>,
    #[serde(default)]
    pub ttl_seconds_after_finished: Option<i32>,
    #[serde(default)]
    pub termination_grace_period_seconds: Option<i64>,
    #[serde(default)]
    pub service_account_name: Option<String>,
    #[serde(default)]
    pub volume_size_gb: Option<u64>,
    /// Arbitrary table, delivered to the step as `config.json`.
    #[serde(default)]
    pub config: Option<toml::Value>,
}

/// `[[definition.pipe]]` entry; both ends are `"<step>:<file>"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipeEntry {
    pub from: String,
    pub to: String,
}

/// `[[run]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub name: String,
    pub pipeline: String,
    /// Concrete version or `*` pattern; empty uses the resolver's default.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

/// Validated manifest.
///
/// Only constructed through `TryFrom<RawManifest>`, so holding one means
/// every definition is a well-formed DAG and every run references a known
/// pipeline.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub operator: OperatorSection,
    pub resync_interval: Duration,
    pub definitions: Vec<PipelineDefinition>,
    pub runs: Vec<PipelineRun>,
}

impl Manifest {
    pub(crate) fn new_unchecked(
        operator: OperatorSection,
        resync_interval: Duration,
        definitions: Vec<PipelineDefinition>,
        runs: Vec<PipelineRun>,
    ) -> Self {
        Self {
            operator,
            resync_interval,
            definitions,
            runs,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            namespace: self.operator.namespace.clone(),
            volume_size_gb: self.operator.volume_size_gb,
            storage_class: self.operator.storage_class.clone(),
            iam_annotation: self.operator.iam_annotation.clone(),
            iam_principal: self.operator.iam_principal.clone(),
        }
    }
}

impl StepEntry {
    pub(crate) fn to_step_spec(&self) -> Result<StepSpec> {
        let config = self
            .config
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| {
                OperatorError::Config(format!("step '{}': config is not valid JSON: {e}", self.id))
            })?;

        Ok(StepSpec {
            id: self.id.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            config,
            job: JobTemplate {
                image: self.image.clone(),
                command: self.command.clone(),
                args: self.args.clone(),
                working_dir: self.working_dir.clone(),
                image_pull_policy: self.image_pull_policy.clone(),
                active_deadline_seconds: self.active_deadline_seconds,
                termination_grace_period_seconds: self.termination_grace_period_seconds,
                ttl_seconds_after_finished: self.ttl_seconds_after_finished,
                backoff_limit: self.backoff_limit,
                service_account_name: self.service_account_name.clone(),
                volume_size_gb: self.volume_size_gb,
            },
        })
    }
}

impl DefinitionConfig {
    /// Convert into a record. Pipe ends must already have been validated.
    pub(crate) fn to_definition(&self, namespace: &str, pipes: Vec<Pipe>) -> Result<PipelineDefinition> {
        let steps = self
            .steps
            .iter()
            .map(StepEntry::to_step_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(PipelineDefinition::new(
            namespace,
            PipelineDefinitionSpec {
                name: self.name.clone(),
                version: self.version.clone(),
                description: self.description.clone(),
                structure: PipelineStructure { steps, pipes },
            },
        ))
    }
}

impl RunConfig {
    pub(crate) fn to_run(&self, namespace: &str) -> PipelineRun {
        let mut run = PipelineRun::new(
            namespace,
            self.name.clone(),
            PipelineRunSpec {
                pipeline_name: self.pipeline.clone(),
                version_pattern: self.version.clone(),
                description: self.description.clone(),
            },
        );
        if self.paused {
            run.status
                .conditions
                .set(ConditionKey::Paused, ConditionStatus::True, "Paused in manifest");
            run.status.phase = Some("Paused".to_string());
        }
        run
    }
}

/// Parse `"250ms"`, `"3s"`, `"1m"` or `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;
    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}
