// tests/job_controller.rs

mod common;
use crate::common::{harness_with_run, linear_pipeline, DefinitionBuilder, Harness, StepBuilder, TestResult};

use pipeline_operator::api::{Kind, PipelineJob, RunOutcome};
use pipeline_operator::engine::{Action, PassOutcome};
use pipeline_operator::errors::OperatorError;
use pipeline_operator::exec::{ExecutorError, WorkloadPhase};
use pipeline_operator::status::{ConditionKey, ConditionStatus};
use pipeline_operator::store::Store;

/// Harness with `a` of a linear pipeline scheduled but not yet submitted.
fn scheduled() -> Result<Harness, Box<dyn std::error::Error>> {
    let h = harness_with_run(&linear_pipeline("lin"), "r1");
    while h.run_pass("r1")?.acted() {}
    assert!(h.job("r1", "a").is_some());
    Ok(h)
}

#[test]
fn submission_is_recorded_once() -> TestResult {
    let h = scheduled()?;
    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::WorkloadSubmitted)
    );

    let job = h.job("r1", "a").ok_or("job missing")?;
    assert!(job.status.conditions.is_true(&ConditionKey::JobCreated));
    assert_eq!(job.status.state.as_deref(), Some("Job created"));

    // Observation mirrors the running workload, then goes idle.
    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::StepStatusPropagated)
    );
    assert_eq!(h.job_pass("r1", "a")?, PassOutcome::Idle);
    let job = h.job("r1", "a").ok_or("job missing")?;
    assert_eq!(job.status.state.as_deref(), Some("Created"));
    assert_eq!(h.executor.submitted(), vec!["r1-a"]);
    Ok(())
}

#[test]
fn completion_is_written_to_the_run_before_the_job() -> TestResult {
    let h = scheduled()?;
    h.job_pass("r1", "a")?;
    h.job_pass("r1", "a")?;
    h.executor.succeed("r1-a");

    // The job write fails after the run has been updated.
    h.store.inject_write_failures(Kind::PipelineJob, 1);
    assert!(h.job_pass("r1", "a").is_err());
    assert!(h.run("r1").has_succeeded("a"));
    let job = h.job("r1", "a").ok_or("job missing")?;
    assert_eq!(
        job.status.conditions.status(&ConditionKey::JobSucceeded),
        Some(ConditionStatus::Unknown)
    );

    // The retry finishes the propagation without touching the run again.
    let run_version = h.run("r1").metadata.resource_version;
    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::StepStatusPropagated)
    );
    assert_eq!(h.run("r1").metadata.resource_version, run_version);
    let job = h.job("r1", "a").ok_or("job missing")?;
    assert_eq!(job.status.state.as_deref(), Some("Done"));
    Ok(())
}

#[test]
fn executor_rejection_fails_the_step_and_the_run() -> TestResult {
    let h = scheduled()?;
    h.executor.reject("r1-a");
    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::WorkloadRejected)
    );

    let job = h.job("r1", "a").ok_or("job missing")?;
    assert_eq!(
        job.status.conditions.status(&ConditionKey::JobCreated),
        Some(ConditionStatus::False)
    );
    assert!(
        job.status
            .state
            .as_deref()
            .is_some_and(|s| s.starts_with("Rejected (") && s.contains("rejected by fake executor"))
    );
    assert_eq!(h.run("r1").step_status("a"), Some(ConditionStatus::False));

    // A rejected job is terminal and is not submitted again.
    assert_eq!(h.job_pass("r1", "a")?, PassOutcome::Idle);
    h.settle()?;
    assert!(h.executor.submitted().is_empty());
    assert_eq!(h.run("r1").status.outcome, Some(RunOutcome::Failed));
    Ok(())
}

#[test]
fn invalid_template_is_rejected_before_submission() -> TestResult {
    let def = DefinitionBuilder::new("bad", "1.0.0")
        .step(StepBuilder::new("a").backoff_limit(-1))
        .build();
    let h = harness_with_run(&def, "r1");
    h.settle()?;

    let job = h.job("r1", "a").ok_or("job missing")?;
    let state = job.status.state.unwrap_or_default();
    assert!(state.contains("backoff_limit must not be negative"), "state: {state}");
    assert!(h.executor.submitted().is_empty());
    assert_eq!(h.run("r1").status.outcome, Some(RunOutcome::Failed));

    let events = h.engine.events().for_object(Kind::PipelineJob, &Harness::key("r1-a"));
    assert!(events.iter().any(|e| e.reason == "WorkloadRejected"));
    Ok(())
}

#[test]
fn unavailable_executor_is_retried_without_failing_the_step() -> TestResult {
    let h = scheduled()?;
    h.executor.make_unavailable(1);

    let err = h.job_pass("r1", "a").expect_err("executor is offline");
    assert!(matches!(
        err,
        OperatorError::Executor(ExecutorError::Unavailable(_))
    ));
    assert_eq!(h.run("r1").step_status("a"), Some(ConditionStatus::Unknown));

    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::WorkloadSubmitted)
    );
    Ok(())
}

#[test]
fn lost_workload_is_resubmitted() -> TestResult {
    let h = harness_with_run(&linear_pipeline("lin"), "r1");
    h.settle()?;
    h.executor.forget("r1-a");

    assert_eq!(
        h.job_pass("r1", "a")?,
        PassOutcome::Acted(Action::WorkloadSubmitted)
    );
    assert_eq!(h.executor.submitted(), vec!["r1-a", "r1-a"]);

    h.settle()?;
    h.complete("r1", "a", WorkloadPhase::Succeeded);
    assert!(h.run("r1").has_succeeded("a"));
    Ok(())
}

#[test]
fn finished_job_without_workload_keeps_its_result() -> TestResult {
    let h = harness_with_run(&linear_pipeline("lin"), "r1");
    h.settle()?;
    h.complete("r1", "a", WorkloadPhase::Failed);
    h.executor.forget("r1-a");

    assert_eq!(h.job_pass("r1", "a")?, PassOutcome::Idle);
    assert_eq!(h.executor.submitted(), vec!["r1-a"]);
    assert_eq!(h.run("r1").step_status("a"), Some(ConditionStatus::False));
    Ok(())
}

#[test]
fn submission_replaces_a_same_named_workload() -> TestResult {
    let h = harness_with_run(&linear_pipeline("lin"), "r1");
    h.settle()?;

    // Lose the job record while the workload keeps running; the run repairs
    // the job and the resubmission must not adopt the old workload.
    h.store.delete::<PipelineJob>(&Harness::key("r1-a"))?;
    h.settle()?;

    assert_eq!(h.executor.deleted(), vec!["r1-a"]);
    assert_eq!(h.executor.submitted(), vec!["r1-a", "r1-a"]);
    Ok(())
}

#[test]
fn descriptor_carries_the_step_template() -> TestResult {
    let def = DefinitionBuilder::new("tpl", "1.0.0")
        .step(
            StepBuilder::new("a")
                .image("python:3.12")
                .script("python run.py")
                .active_deadline_seconds(300)
                .backoff_limit(2)
                .service_account("pipelines"),
        )
        .build();
    let h = harness_with_run(&def, "r1");
    h.settle()?;

    let descriptor = h.executor.descriptor("r1-a").ok_or("not submitted")?;
    assert_eq!(descriptor.container.image, "python:3.12");
    assert_eq!(descriptor.container.command, vec!["sh", "-c", "python run.py"]);
    assert_eq!(descriptor.limits.active_deadline_seconds, Some(300));
    assert_eq!(descriptor.limits.backoff_limit, Some(2));
    assert_eq!(descriptor.limits.service_account_name.as_deref(), Some("pipelines"));
    Ok(())
}
