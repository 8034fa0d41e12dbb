// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{Kind, PipelineJob, PipelineRun};
use crate::errors::{OperatorError, Result};
use crate::exec::WorkloadExecutor;
use crate::store::{Change, Store};

use super::{Engine, PassOutcome, RuntimeEvent, RuntimeOptions, WorkItem, WorkQueue};

/// Upper bound on passes between two looks at the event channel, so a
/// busy queue cannot starve shutdown requests.
const MAX_PASSES_PER_DRAIN: usize = 1024;

/// Drives the reconcilers in response to `RuntimeEvent`s and a periodic
/// resync.
///
/// This is a pure IO shell around [`Engine`]: it turns notifications into
/// queued reconcile requests, runs passes until the queue is empty, and
/// decides when to stop. A pass that acted is queued again, since each pass
/// performs at most one action.
pub struct Runtime<S, E> {
    engine: Engine<S, E>,
    event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
    queue: WorkQueue,
    options: RuntimeOptions,
}

impl<S, E> fmt::Debug for Runtime<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("queue", &self.queue)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: Store, E: WorkloadExecutor> Runtime<S, E> {
    pub fn new(
        engine: Engine<S, E>,
        event_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            engine,
            event_rx,
            queue: WorkQueue::new(),
            options,
        }
    }

    pub fn engine(&self) -> &Engine<S, E> {
        &self.engine
    }

    /// Main event loop.
    ///
    /// - Seeds the queue with every known record.
    /// - Runs reconcile passes until the queue drains.
    /// - Waits for the next notification or resync tick.
    pub async fn run(mut self) -> Result<()> {
        info!(
            resync_ms = self.options.resync_interval.as_millis() as u64,
            exit_when_settled = self.options.exit_when_settled,
            "pipeline operator runtime started"
        );

        let mut resync = tokio::time::interval(self.options.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.drain_queue();

            if self.options.exit_when_settled && self.queue.is_empty() {
                match self.engine.all_runs_settled() {
                    Ok(true) => {
                        info!("all runs settled; stopping runtime");
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "could not determine whether runs are settled"),
                }
            }

            tokio::select! {
                event = self.event_rx.recv() => {
                    let Some(event) = event else {
                        info!("runtime event channel closed; exiting");
                        break;
                    };
                    debug!(?event, "runtime received event");
                    if !self.handle_event(event) {
                        info!("shutdown requested; stopping runtime");
                        break;
                    }
                }
                _ = resync.tick() => self.resync(),
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Translate one event into reconcile requests.
    ///
    /// Returns `false` when the runtime should stop.
    fn handle_event(&mut self, event: RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::RecordChanged { change: Change::Deleted, .. } => {}
            RuntimeEvent::RecordChanged { kind, key, .. } => match kind {
                Kind::PipelineDefinition => {
                    self.queue.push(WorkItem::new(kind, key));
                    // Runs may be waiting for this definition.
                    self.enqueue_all::<PipelineRun>();
                }
                Kind::PipelineRun | Kind::PipelineJob => {
                    self.queue.push(WorkItem::new(kind, key));
                }
                // Submissions wait for configuration to be delivered.
                Kind::StepConfig => self.enqueue_all::<PipelineJob>(),
                Kind::VolumeClaim | Kind::ServiceAccount => {}
            },
            RuntimeEvent::WorkloadFinished { job, phase } => {
                debug!(job = %job, %phase, "workload finished");
                self.queue.push(WorkItem::new(Kind::PipelineJob, job));
            }
            RuntimeEvent::ShutdownRequested => return false,
        }
        true
    }

    fn enqueue_all<R: crate::api::Record>(&mut self) {
        match self.engine.store().list::<R>(&self.engine.settings().namespace) {
            Ok(records) => self.queue.extend(records.iter().map(WorkItem::of)),
            Err(e) => warn!(kind = %R::KIND, error = %e, "failed to list records"),
        }
    }

    fn resync(&mut self) {
        match self.engine.resync_items() {
            Ok(items) => {
                debug!(items = items.len(), "periodic resync");
                self.queue.extend(items);
            }
            Err(e) => warn!(error = %e, "resync failed; retrying on next tick"),
        }
    }

    fn drain_queue(&mut self) {
        for _ in 0..MAX_PASSES_PER_DRAIN {
            let Some(item) = self.queue.pop() else {
                return;
            };
            match self.engine.reconcile(&item) {
                Ok(PassOutcome::Acted(action)) => {
                    debug!(kind = %item.kind, key = %item.key, %action, "reconcile pass acted");
                    self.queue.push(item);
                }
                Ok(outcome) => {
                    debug!(kind = %item.kind, key = %item.key, ?outcome, "reconcile pass idle");
                }
                Err(err) => self.pass_aborted(item, err),
            }
        }
        debug!(remaining = self.queue.len(), "pass budget exhausted; yielding");
    }

    fn pass_aborted(&mut self, item: WorkItem, err: OperatorError) {
        let message = format!("{} pass aborted: {err}", pass_name(item.kind));
        match &err {
            // Already reported by the run state machine.
            OperatorError::DefinitionNotFound(_) => {
                debug!(key = %item.key, error = %err, "waiting for pipeline definition");
            }
            _ if err.is_conflict() => {
                debug!(kind = %item.kind, key = %item.key, error = %err, "write conflict; retrying pass");
                self.engine
                    .events()
                    .normal(item.kind, &item.key, "WriteConflict", message);
                self.queue.push(item);
            }
            _ => {
                warn!(kind = %item.kind, key = %item.key, error = %err, "reconcile pass aborted");
                self.engine
                    .events()
                    .warning(item.kind, &item.key, "ReconcileFailed", message);
            }
        }
    }
}

fn pass_name(kind: Kind) -> &'static str {
    match kind {
        Kind::PipelineDefinition => "definition",
        Kind::PipelineRun => "run",
        Kind::PipelineJob => "unit-of-work",
        Kind::VolumeClaim => "volume",
        Kind::StepConfig => "step-config",
        Kind::ServiceAccount => "service-account",
    }
}
