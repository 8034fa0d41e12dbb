// src/materialize/mod.rs

//! Resource materializer.
//!
//! Turns a unit of work ([`PipelineJob`]) into a [`WorkloadDescriptor`]:
//! - a scratch working directory at [`WORKDIR_PATH`] with an `input/`
//!   directory populated by symlinks, one per input pipe
//! - one read-only mount per distinct upstream volume at `/vol/<step>`
//! - the step's own output volume at `/vol/<step>`, linked as `output`
//! - the step's configuration entry at `/etc/config/config.json`
//!
//! Naming is deterministic in `(run, step)`, so repeated passes always
//! target the same records.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::api::{standard_labels, InputBinding, PipelineJob};
use crate::dag::PipeGraph;

pub mod workload;

pub use workload::{
    Container, ExecutionLimits, InitCommand, InitStage, Volume, VolumeMount, VolumeSource,
    WorkloadDescriptor,
};

/// Longest name accepted for records and workloads.
pub const MAX_NAME_LEN: usize = 63;

pub const WORKDIR_VOLUME: &str = "workdir";
pub const WORKDIR_PATH: &str = "/workdir";
pub const WORKDIR_SIZE_GB: u64 = 1;
pub const CONFIG_VOLUME: &str = "config";
pub const CONFIG_PATH: &str = "/etc/config";
pub const CONFIG_FILE: &str = "config.json";
pub const INIT_IMAGE: &str = "bash";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaterializeError {
    #[error("name collision in workload {workload}: {what} '{name}' is used twice")]
    NameCollision {
        workload: String,
        what: &'static str,
        name: String,
    },

    #[error("invalid job template for step {step}: {reason}")]
    InvalidTemplate { step: String, reason: String },
}

/// Name of the unit of work and of its workload.
pub fn job_name(run: &str, step: &str) -> String {
    bounded_name(&format!("{run}-{step}"))
}

/// Name of the output volume claim of `step` in `run`.
pub fn volume_name(run: &str, step: &str) -> String {
    bounded_name(&format!("{run}-{step}"))
}

/// Mount path of the output volume of `step`, in producer and consumers.
pub fn mount_path(step: &str) -> String {
    format!("/vol/{step}")
}

/// Names up to [`MAX_NAME_LEN`] are returned unchanged; longer ones are cut
/// and suffixed with a hash of the full name so distinct inputs stay
/// distinct.
pub fn bounded_name(raw: &str) -> String {
    if raw.len() <= MAX_NAME_LEN {
        return raw.to_string();
    }
    let hash = blake3::hash(raw.as_bytes()).to_hex();
    let suffix = &hash.as_str()[..8];

    let mut cut = MAX_NAME_LEN - suffix.len() - 1;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    let head = raw[..cut].trim_end_matches(['-', '.']);
    format!("{head}-{suffix}")
}

/// Resolve the input pipes of `step` into bindings, in pipe order.
pub fn input_bindings(run: &str, graph: &PipeGraph<'_>, step: &str) -> Vec<InputBinding> {
    graph
        .inputs_of(step)
        .map(|pipe| InputBinding {
            volume: volume_name(run, &pipe.from.step_id),
            mount_path: mount_path(&pipe.from.step_id),
            source_file: pipe.from.name.clone(),
            target_file: pipe.to.name.clone(),
        })
        .collect()
}

/// Build the workload descriptor for `job`.
///
/// Fails without side effects when the template is unusable or two volumes
/// or mounts would end up with the same name.
pub fn materialize(job: &PipelineJob) -> Result<WorkloadDescriptor, MaterializeError> {
    let spec = &job.spec;
    let name = job.metadata.name.clone();
    let template = &spec.job;

    if template.image.trim().is_empty() {
        return Err(MaterializeError::InvalidTemplate {
            step: spec.step_id.clone(),
            reason: "image must not be empty".to_string(),
        });
    }
    if let Some(limit) = template.backoff_limit.filter(|l| *l < 0) {
        return Err(MaterializeError::InvalidTemplate {
            step: spec.step_id.clone(),
            reason: format!("backoff_limit must not be negative (got {limit})"),
        });
    }

    let output_volume = volume_name(&spec.pipeline_run, &spec.step_id);
    let output_path = mount_path(&spec.step_id);

    let mut volumes = vec![
        Volume {
            name: WORKDIR_VOLUME.to_string(),
            source: VolumeSource::Scratch {
                size_limit_gb: WORKDIR_SIZE_GB,
            },
        },
        Volume {
            name: CONFIG_VOLUME.to_string(),
            source: VolumeSource::StepConfig {
                record: spec.pipeline_definition.clone(),
                key: spec.step_id.clone(),
                file: CONFIG_FILE.to_string(),
            },
        },
    ];
    let mut mounts = vec![
        VolumeMount {
            volume: WORKDIR_VOLUME.to_string(),
            mount_path: WORKDIR_PATH.to_string(),
            read_only: false,
        },
        VolumeMount {
            volume: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_PATH.to_string(),
            read_only: true,
        },
    ];

    // One mount per distinct upstream volume.
    let mut seen = BTreeSet::new();
    for input in &spec.inputs {
        if !seen.insert(input.volume.as_str()) {
            continue;
        }
        volumes.push(Volume {
            name: input.volume.clone(),
            source: VolumeSource::Claim {
                claim: input.volume.clone(),
                read_only: true,
            },
        });
        mounts.push(VolumeMount {
            volume: input.volume.clone(),
            mount_path: input.mount_path.clone(),
            read_only: true,
        });
    }

    volumes.push(Volume {
        name: output_volume.clone(),
        source: VolumeSource::Claim {
            claim: output_volume.clone(),
            read_only: false,
        },
    });
    mounts.push(VolumeMount {
        volume: output_volume,
        mount_path: output_path.clone(),
        read_only: false,
    });

    check_unique(&name, "volume", volumes.iter().map(|v| v.name.as_str()))?;
    check_unique(&name, "mount path", mounts.iter().map(|m| m.mount_path.as_str()))?;
    check_unique(
        &name,
        "input file",
        spec.inputs.iter().map(|i| i.target_file.as_str()),
    )?;

    let mut commands = vec![InitCommand::MakeDir("input".to_string())];
    commands.extend(spec.inputs.iter().map(|input| InitCommand::Symlink {
        source: format!("{}/{}", input.mount_path, input.source_file),
        link: format!("{WORKDIR_PATH}/input/{}", input.target_file),
    }));
    commands.push(InitCommand::Symlink {
        source: output_path,
        link: "output".to_string(),
    });
    commands.push(InitCommand::Echo("Initialization done".to_string()));

    let mut labels = standard_labels(&spec.step_id, &spec.pipeline_run);
    labels.extend(job.metadata.labels.clone());

    Ok(WorkloadDescriptor {
        name,
        namespace: job.metadata.namespace.clone(),
        labels,
        init: InitStage {
            image: INIT_IMAGE.to_string(),
            working_dir: WORKDIR_PATH.to_string(),
            commands,
            mounts: mounts.clone(),
        },
        container: Container {
            image: template.image.clone(),
            command: template.command.clone(),
            args: template.args.clone(),
            working_dir: template
                .working_dir
                .clone()
                .unwrap_or_else(|| WORKDIR_PATH.to_string()),
            image_pull_policy: template.image_pull_policy.clone(),
            mounts,
        },
        volumes,
        limits: ExecutionLimits {
            active_deadline_seconds: template.active_deadline_seconds,
            backoff_limit: template.backoff_limit,
            ttl_seconds_after_finished: template.ttl_seconds_after_finished,
            termination_grace_period_seconds: template.termination_grace_period_seconds,
            service_account_name: template.service_account_name.clone(),
        },
    })
}

fn check_unique<'a>(
    workload: &str,
    what: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), MaterializeError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(MaterializeError::NameCollision {
                workload: workload.to_string(),
                what,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
