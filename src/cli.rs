// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `pipeline-operator`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipeline-operator",
    version,
    about = "Execute DAG pipelines as isolated workloads wired together by volumes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline manifest (TOML).
    #[arg(long, value_name = "PATH", default_value = "Pipelines.toml")]
    pub manifest: String,

    /// Exit once every run has settled instead of running until Ctrl-C.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPELINE_OPERATOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print definitions and runs, but execute nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
