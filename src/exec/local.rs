// src/exec/local.rs

//! Local process executor.
//!
//! Every workload gets a sandbox directory `<data_dir>/workloads/<name>`
//! whose `root/` stands in for the container filesystem: a container path
//! such as `/vol/extract` becomes `<sandbox>/root/vol/extract`. Volume
//! claims live under `<data_dir>/volumes/<claim>` and are linked into the
//! sandbox at their mount paths, so a producer's output directory is the
//! consumer's input directory.
//!
//! The init commands are applied to the sandbox directly; the main command
//! then runs with `tokio::process` in the mapped working directory,
//! honouring the backoff limit (extra attempts) and the active deadline
//! (covering all attempts). Completion updates the workload's phase and is
//! announced to the runtime as [`RuntimeEvent::WorkloadFinished`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::api::{ObjectKey, StepConfig};
use crate::engine::RuntimeEvent;
use crate::materialize::{InitCommand, VolumeSource, WorkloadDescriptor};
use crate::store::Store;

use super::{ExecutorError, WorkloadExecutor, WorkloadPhase};

#[derive(Debug)]
struct LocalWorkload {
    /// Distinguishes a resubmitted workload from an older one of the same
    /// name whose process is still winding down.
    generation: u64,
    phase: WorkloadPhase,
    cancel: Option<oneshot::Sender<()>>,
}

#[derive(Debug, Default)]
struct Workloads {
    entries: HashMap<String, LocalWorkload>,
    next_generation: u64,
}

/// Runs workloads as local processes.
pub struct LocalExecutor<S> {
    data_dir: PathBuf,
    store: Arc<S>,
    notifier: Option<mpsc::UnboundedSender<RuntimeEvent>>,
    handle: Handle,
    workloads: Arc<Mutex<Workloads>>,
}

impl<S> std::fmt::Debug for LocalExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Everything the background task needs; owned so it can outlive `submit`.
struct Prepared {
    key: ObjectKey,
    sandbox: PathBuf,
    volumes_dir: PathBuf,
    descriptor: WorkloadDescriptor,
    /// Host path and contents of each configuration file to write.
    config_files: Vec<(String, String)>,
}

impl<S: Store + 'static> LocalExecutor<S> {
    /// Must be called from within a Tokio runtime.
    pub fn new(
        data_dir: impl Into<PathBuf>,
        store: Arc<S>,
        notifier: Option<mpsc::UnboundedSender<RuntimeEvent>>,
    ) -> Result<Self, ExecutorError> {
        let handle = Handle::try_current()
            .map_err(|e| ExecutorError::Unavailable(format!("no async runtime: {e}")))?;
        Ok(Self {
            data_dir: data_dir.into(),
            store,
            notifier,
            handle,
            workloads: Arc::default(),
        })
    }

    pub fn volume_dir(&self, claim: &str) -> PathBuf {
        self.data_dir.join("volumes").join(claim)
    }

    pub fn sandbox_dir(&self, workload: &str) -> PathBuf {
        self.data_dir.join("workloads").join(workload)
    }

    fn lock(&self) -> MutexGuard<'_, Workloads> {
        self.workloads.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve configuration mounts against the store.
    ///
    /// A missing record is reported as unavailable so the submission is
    /// retried once configuration has been delivered.
    fn config_files(
        &self,
        descriptor: &WorkloadDescriptor,
    ) -> Result<Vec<(String, String)>, ExecutorError> {
        let mut files = Vec::new();
        for mount in &descriptor.container.mounts {
            let Some(volume) = descriptor.volume(&mount.volume) else {
                return Err(ExecutorError::Rejected {
                    name: descriptor.name.clone(),
                    reason: format!("mount references unknown volume '{}'", mount.volume),
                });
            };
            if let VolumeSource::StepConfig { record, key, file } = &volume.source {
                let record_key = ObjectKey::new(descriptor.namespace.clone(), record.clone());
                let config = self
                    .store
                    .get::<StepConfig>(&record_key)
                    .map_err(|e| ExecutorError::Unavailable(e.to_string()))?
                    .ok_or_else(|| {
                        ExecutorError::Unavailable(format!("step config {record_key} not found"))
                    })?;
                let contents = config.data.get(key).cloned().ok_or_else(|| {
                    ExecutorError::Unavailable(format!(
                        "step config {record_key} has no entry for '{key}'"
                    ))
                })?;
                files.push((format!("{}/{}", mount.mount_path, file), contents));
            }
        }
        Ok(files)
    }
}

impl<S: Store + 'static> WorkloadExecutor for LocalExecutor<S> {
    fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<String, ExecutorError> {
        if descriptor.container.command.is_empty() {
            return Err(ExecutorError::Rejected {
                name: descriptor.name.clone(),
                reason: "container has no command".to_string(),
            });
        }
        let config_files = self.config_files(descriptor)?;

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let generation = {
            let mut workloads = self.lock();
            if workloads.entries.contains_key(&descriptor.name) {
                return Err(ExecutorError::AlreadyExists(descriptor.name.clone()));
            }
            workloads.next_generation += 1;
            let generation = workloads.next_generation;
            workloads.entries.insert(
                descriptor.name.clone(),
                LocalWorkload {
                    generation,
                    phase: WorkloadPhase::Running,
                    cancel: Some(cancel_tx),
                },
            );
            generation
        };

        let prepared = Prepared {
            key: ObjectKey::new(descriptor.namespace.clone(), descriptor.name.clone()),
            sandbox: self.sandbox_dir(&descriptor.name),
            volumes_dir: self.data_dir.join("volumes"),
            descriptor: descriptor.clone(),
            config_files,
        };
        info!(workload = %descriptor.name, "submitting local workload");
        self.handle.spawn(supervise(
            prepared,
            generation,
            Arc::clone(&self.workloads),
            self.notifier.clone(),
            cancel_rx,
        ));
        Ok(descriptor.name.clone())
    }

    fn phase(&self, name: &str) -> Result<Option<WorkloadPhase>, ExecutorError> {
        Ok(self.lock().entries.get(name).map(|w| w.phase))
    }

    fn delete(&self, name: &str) -> Result<bool, ExecutorError> {
        let Some(mut workload) = self.lock().entries.remove(name) else {
            return Ok(false);
        };
        if let Some(cancel) = workload.cancel.take() {
            let _ = cancel.send(());
        }
        remove_dir_if_present(&self.sandbox_dir(name))?;
        debug!(workload = %name, "deleted local workload");
        Ok(true)
    }

    fn release_volume(&self, claim: &str) -> Result<(), ExecutorError> {
        remove_dir_if_present(&self.volume_dir(claim))?;
        debug!(%claim, "released local volume");
        Ok(())
    }
}

fn remove_dir_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Run one workload to completion unless it is cancelled first.
///
/// A cancelled workload reports nothing: it has been deleted and a newer
/// one may already use its name.
async fn supervise(
    prepared: Prepared,
    generation: u64,
    workloads: Arc<Mutex<Workloads>>,
    notifier: Option<mpsc::UnboundedSender<RuntimeEvent>>,
    cancel_rx: oneshot::Receiver<()>,
) {
    let key = prepared.key.clone();

    let phase = tokio::select! {
        result = execute(&prepared) => match result {
            Ok(phase) => phase,
            Err(err) => {
                error!(workload = %key.name, error = %err, "local workload error");
                WorkloadPhase::Failed
            }
        },
        _ = cancel_rx => {
            info!(workload = %key.name, "workload deleted while running; process killed");
            return;
        }
    };

    {
        let mut guard = workloads.lock().unwrap_or_else(|e| e.into_inner());
        match guard.entries.get_mut(&key.name) {
            Some(entry) if entry.generation == generation => {
                entry.phase = phase;
                entry.cancel = None;
            }
            _ => return,
        }
    }

    info!(workload = %key.name, %phase, "local workload finished");
    if let Some(tx) = notifier {
        let _ = tx.send(RuntimeEvent::WorkloadFinished { job: key, phase });
    }
}

async fn execute(prepared: &Prepared) -> Result<WorkloadPhase> {
    let root = prepared.sandbox.join("root");
    prepare_sandbox(prepared, &root).await?;
    run_init(&prepared.descriptor, &root).await?;

    let limits = &prepared.descriptor.limits;
    let attempts = limits.backoff_limit.unwrap_or(0).max(0) as u32 + 1;
    let run = run_attempts(prepared, &root, attempts);

    match limits.active_deadline_seconds {
        Some(secs) if secs > 0 => {
            match tokio::time::timeout(Duration::from_secs(secs as u64), run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        workload = %prepared.key.name,
                        deadline_secs = secs,
                        "workload exceeded its active deadline"
                    );
                    Ok(WorkloadPhase::Failed)
                }
            }
        }
        _ => run.await,
    }
}

async fn run_attempts(prepared: &Prepared, root: &Path, attempts: u32) -> Result<WorkloadPhase> {
    for attempt in 1..=attempts {
        if run_main(prepared, root, attempt).await? {
            return Ok(WorkloadPhase::Succeeded);
        }
        if attempt < attempts {
            info!(workload = %prepared.key.name, attempt, "retrying failed workload");
        }
    }
    Ok(WorkloadPhase::Failed)
}

/// Map a container path to its location in the sandbox root.
fn host_path(root: &Path, path: &str, working_dir: &str) -> PathBuf {
    if let Some(abs) = path.strip_prefix('/') {
        root.join(abs)
    } else {
        root.join(working_dir.trim_start_matches('/')).join(path)
    }
}

async fn prepare_sandbox(prepared: &Prepared, root: &Path) -> Result<()> {
    let descriptor = &prepared.descriptor;
    let cwd = &descriptor.container.working_dir;

    if tokio::fs::try_exists(&prepared.sandbox).await? {
        tokio::fs::remove_dir_all(&prepared.sandbox)
            .await
            .with_context(|| format!("clearing sandbox {}", prepared.sandbox.display()))?;
    }
    tokio::fs::create_dir_all(root).await?;

    for mount in &descriptor.container.mounts {
        let Some(volume) = descriptor.volume(&mount.volume) else {
            bail!("mount references unknown volume '{}'", mount.volume);
        };
        let target = host_path(root, &mount.mount_path, cwd);
        match &volume.source {
            VolumeSource::Scratch { .. } | VolumeSource::StepConfig { .. } => {
                tokio::fs::create_dir_all(&target).await?;
            }
            VolumeSource::Claim { claim, .. } => {
                let backing = prepared.volumes_dir.join(claim);
                tokio::fs::create_dir_all(&backing).await?;
                let backing = tokio::fs::canonicalize(&backing).await?;
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                symlink(&backing, &target)
                    .await
                    .with_context(|| format!("mounting claim {claim} at {}", mount.mount_path))?;
            }
        }
    }

    for (path, contents) in &prepared.config_files {
        tokio::fs::write(host_path(root, path, cwd), contents).await?;
    }
    Ok(())
}

async fn run_init(descriptor: &WorkloadDescriptor, root: &Path) -> Result<()> {
    let init = &descriptor.init;
    debug!(workload = %descriptor.name, script = %init.script(), "running init stage");

    for command in &init.commands {
        match command {
            InitCommand::MakeDir(path) => {
                tokio::fs::create_dir_all(host_path(root, path, &init.working_dir)).await?;
            }
            InitCommand::Symlink { source, link } => {
                let source = host_path(root, source, &init.working_dir);
                let link = host_path(root, link, &init.working_dir);
                symlink(&source, &link)
                    .await
                    .with_context(|| format!("init stage: {command}"))?;
            }
            InitCommand::Echo(text) => info!(workload = %descriptor.name, "{text}"),
        }
    }
    Ok(())
}

/// Run the main command once; `Ok(true)` on a zero exit status.
async fn run_main(prepared: &Prepared, root: &Path, attempt: u32) -> Result<bool> {
    let container = &prepared.descriptor.container;
    let name = &prepared.key.name;
    let Some((program, rest)) = container.command.split_first() else {
        bail!("container has no command");
    };

    info!(
        workload = %name,
        attempt,
        image = %container.image,
        cmd = ?container.command,
        "starting workload process"
    );

    let mut cmd = Command::new(program);
    cmd.args(rest)
        .args(&container.args)
        .current_dir(host_path(root, &container.working_dir, "/"))
        .env("PIPELINE_SANDBOX_ROOT", root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for workload '{name}'"))?;

    if let Some(stdout) = child.stdout.take() {
        let name = name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(workload = %name, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let name = name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(workload = %name, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of workload '{name}'"))?;
    info!(
        workload = %name,
        attempt,
        exit_code = status.code().unwrap_or(-1),
        success = status.success(),
        "workload process exited"
    );
    Ok(status.success())
}

#[cfg(unix)]
async fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(source, link).await
}

#[cfg(windows)]
async fn symlink(source: &Path, link: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_dir(source, link).await
}
