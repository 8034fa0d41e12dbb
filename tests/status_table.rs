// tests/status_table.rs

mod common;
use crate::common::{diamond_pipeline, harness_with_run, RunBuilder, TestResult};

use pipeline_operator::api::PipelineRun;
use pipeline_operator::exec::WorkloadPhase;
use pipeline_operator::render_status_table;
use pipeline_operator::store::Store;

#[test]
fn table_lists_one_row_per_run() -> TestResult {
    let h = harness_with_run(&diamond_pipeline("fork"), "done");
    h.create(&RunBuilder::new("waiting", "fork").paused().build());
    h.settle()?;
    for step in ["a", "b", "c", "d"] {
        h.complete("done", step, WorkloadPhase::Succeeded);
    }

    let runs = h.store.list::<PipelineRun>(common::NAMESPACE)?;
    let table = render_status_table(&runs);
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);

    let header: Vec<&str> = lines[0].split_whitespace().collect();
    assert_eq!(
        header,
        ["RUN", "PIPELINE", "VERSION", "PHASE", "ACTIVE", "SUCCEEDED", "FAILED", "TOTAL", "OUTCOME"]
    );
    let done: Vec<&str> = lines[1].split_whitespace().collect();
    assert_eq!(done, ["done", "fork", "1.0.0", "Succeeded", "0", "4", "0", "4", "Succeeded"]);

    let waiting = lines[2];
    assert!(waiting.starts_with("waiting"));
    assert!(waiting.trim_end().ends_with('-'), "unfinished run has no outcome: {waiting}");

    // Columns line up across rows.
    let col = lines[0].find("PIPELINE").ok_or("no PIPELINE column")?;
    assert_eq!(lines[1].find("fork"), Some(col));
    Ok(())
}

#[test]
fn empty_store_renders_only_the_header() {
    let table = render_status_table(&[]);
    assert_eq!(table.lines().count(), 1);
    assert!(table.starts_with("RUN"));
}
