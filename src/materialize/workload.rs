// src/materialize/workload.rs

//! Physical workload descriptor handed to the executor.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Everything an executor needs to run one step of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub init: InitStage,
    pub container: Container,
    pub volumes: Vec<Volume>,
    pub limits: ExecutionLimits,
}

impl WorkloadDescriptor {
    pub fn volume(&self, name: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.name == name)
    }
}

/// Pre-stage that wires inputs and outputs into the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitStage {
    pub image: String,
    pub working_dir: String,
    pub commands: Vec<InitCommand>,
    pub mounts: Vec<VolumeMount>,
}

impl InitStage {
    /// Commands joined into one shell script; stops at the first failure.
    pub fn script(&self) -> String {
        self.commands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" && ")
    }

    /// `bash -c <script>`.
    pub fn shell_command(&self) -> Vec<String> {
        vec!["bash".to_string(), "-c".to_string(), self.script()]
    }
}

/// One command of the init stage. Relative paths are relative to the
/// stage's working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitCommand {
    MakeDir(String),
    /// `ln -s <source> <link>`.
    Symlink { source: String, link: String },
    Echo(String),
}

impl fmt::Display for InitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitCommand::MakeDir(path) => write!(f, "mkdir {path}"),
            InitCommand::Symlink { source, link } => write!(f, "ln -s {source} {link}"),
            InitCommand::Echo(text) => write!(f, "echo {text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub image: String,
    pub command: Vec<String>,
    pub args: Vec<String>,
    pub working_dir: String,
    pub image_pull_policy: Option<String>,
    pub mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSource {
    /// A persistent volume claim.
    Claim { claim: String, read_only: bool },
    /// One entry of a `StepConfig` record, exposed as `file`.
    StepConfig {
        record: String,
        key: String,
        file: String,
    },
    /// Empty scratch space that lives as long as the workload.
    Scratch { size_limit_gb: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub volume: String,
    pub mount_path: String,
    pub read_only: bool,
}

/// Limits copied verbatim from the step's workload template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub active_deadline_seconds: Option<i64>,
    pub backoff_limit: Option<i32>,
    pub ttl_seconds_after_finished: Option<i32>,
    pub termination_grace_period_seconds: Option<i64>,
    pub service_account_name: Option<String>,
}
