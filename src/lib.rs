// src/lib.rs

pub mod api;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod materialize;
pub mod status;
pub mod store;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::api::PipelineRun;
use crate::cli::CliArgs;
use crate::config::{load_and_validate, Manifest};
use crate::engine::{Engine, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::LocalExecutor;
use crate::store::{MemoryStore, Store};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading
/// - the in-memory store, seeded with definitions and runs
/// - the local executor
/// - the engine and its runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let manifest_path = PathBuf::from(&args.manifest);
    let manifest = load_and_validate(&manifest_path)?;

    if args.dry_run {
        print_dry_run(&manifest);
        return Ok(());
    }

    let (rt_tx, rt_rx) = mpsc::unbounded_channel::<RuntimeEvent>();

    let store = Arc::new(MemoryStore::with_notifier(rt_tx.clone()));
    seed_store(store.as_ref(), &manifest)?;

    let executor = Arc::new(LocalExecutor::new(
        manifest.operator.data_dir.clone(),
        Arc::clone(&store),
        Some(rt_tx.clone()),
    )?);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested);
        });
    }

    let engine = Engine::new(Arc::clone(&store), executor, manifest.engine_settings());
    let options = RuntimeOptions {
        exit_when_settled: args.once,
        resync_interval: manifest.resync_interval,
    };
    Runtime::new(engine, rt_rx, options).run().await?;

    let runs = store.list::<PipelineRun>(&manifest.operator.namespace)?;
    print!("{}", render_status_table(&runs));
    Ok(())
}

/// Create every definition and run of the manifest in `store`.
pub fn seed_store<S: Store>(store: &S, manifest: &Manifest) -> crate::errors::Result<()> {
    for def in &manifest.definitions {
        store.create(def)?;
    }
    for run in &manifest.runs {
        store.create(run)?;
    }
    info!(
        definitions = manifest.definitions.len(),
        runs = manifest.runs.len(),
        "seeded store from manifest"
    );
    Ok(())
}

/// One line per run: phase, step counters and outcome.
pub fn render_status_table(runs: &[PipelineRun]) -> String {
    let header = [
        "RUN", "PIPELINE", "VERSION", "PHASE", "ACTIVE", "SUCCEEDED", "FAILED", "TOTAL", "OUTCOME",
    ];
    let rows: Vec<[String; 9]> = runs
        .iter()
        .map(|run| {
            let status = &run.status;
            [
                run.name().to_string(),
                run.spec.pipeline_name.clone(),
                status.pipeline_version.clone().unwrap_or_else(|| "-".to_string()),
                status.phase.clone().unwrap_or_else(|| "Pending".to_string()),
                status.steps_active.to_string(),
                status.steps_succeeded.to_string(),
                status.steps_failed.to_string(),
                status.steps_total.to_string(),
                status
                    .outcome
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();

    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", format_row(header.iter().copied(), &widths));
    for row in &rows {
        let _ = writeln!(out, "{}", format_row(row.iter().map(String::as_str), &widths));
    }
    out
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let line = cells
        .zip(widths.iter().copied())
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

/// Simple dry-run output: print definitions, pipes and runs.
fn print_dry_run(manifest: &Manifest) {
    println!("pipeline-operator dry-run");
    println!("  operator.namespace = {}", manifest.operator.namespace);
    println!("  operator.data_dir = {}", manifest.operator.data_dir.display());
    println!("  operator.resync_interval = {:?}", manifest.resync_interval);
    println!();

    println!("definitions ({}):", manifest.definitions.len());
    for def in &manifest.definitions {
        println!("  - {} ({})", def.spec.name, def.spec.version);
        for step in &def.spec.structure.steps {
            println!("      step {}: image={} command={:?}", step.id, step.job.image, step.job.command);
            if !step.inputs.is_empty() {
                println!("        inputs: {:?}", step.inputs);
            }
        }
        for pipe in &def.spec.structure.pipes {
            println!("      pipe {pipe}");
        }
    }
    println!();

    println!("runs ({}):", manifest.runs.len());
    for run in &manifest.runs {
        let pattern = if run.spec.version_pattern.is_empty() {
            "<default>"
        } else {
            run.spec.version_pattern.as_str()
        };
        println!("  - {} -> {}@{}", run.name(), run.spec.pipeline_name, pattern);
    }

    debug!("dry-run complete (no execution)");
}
