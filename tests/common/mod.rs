// tests/common/mod.rs

#![allow(dead_code)]

use std::error::Error;
use std::path::PathBuf;

use tempfile::TempDir;

pub use pipeline_operator_test_utils::{
    diamond_pipeline, init_tracing, linear_pipeline, DefinitionBuilder, FakeExecutor, Harness,
    RunBuilder, StepBuilder, NAMESPACE, with_timeout,
};

pub type TestResult = Result<(), Box<dyn Error>>;

/// Write `contents` to `Pipelines.toml` in a fresh temporary directory.
///
/// The directory must be kept alive for as long as the file is used.
pub fn write_manifest(contents: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("Pipelines.toml");
    std::fs::write(&path, contents)?;
    Ok((dir, path))
}

/// Harness with `definition` stored and a run `run` of it created.
pub fn harness_with_run(
    definition: &pipeline_operator::api::PipelineDefinition,
    run: &str,
) -> Harness {
    init_tracing();
    let h = Harness::new();
    h.add_definition(definition);
    h.create(&RunBuilder::new(run, &definition.spec.name).build());
    h
}
