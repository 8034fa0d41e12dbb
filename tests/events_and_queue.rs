// tests/events_and_queue.rs

use pipeline_operator::api::{Kind, ObjectKey};
use pipeline_operator::engine::{EventRecorder, Severity, WorkItem, WorkQueue};

fn key(name: &str) -> ObjectKey {
    ObjectKey::new("default", name)
}

#[test]
fn identical_consecutive_events_are_folded() {
    let events = EventRecorder::default();
    events.warning(Kind::PipelineRun, &key("r1"), "DefinitionNotFound", "missing p-1");
    events.warning(Kind::PipelineRun, &key("r1"), "DefinitionNotFound", "missing p-1");
    events.normal(Kind::PipelineRun, &key("r2"), "StepScheduled", "Scheduled step a");
    events.warning(Kind::PipelineRun, &key("r1"), "DefinitionNotFound", "missing p-1");

    let r1 = events.for_object(Kind::PipelineRun, &key("r1"));
    assert_eq!(r1.len(), 1);
    assert_eq!(r1[0].count, 3);
    assert_eq!(r1[0].severity, Severity::Warning);

    events.warning(Kind::PipelineRun, &key("r1"), "DefinitionNotFound", "missing p-2");
    assert_eq!(events.for_object(Kind::PipelineRun, &key("r1")).len(), 2);
    assert_eq!(events.all().len(), 3);
}

#[test]
fn events_are_scoped_by_kind() {
    let events = EventRecorder::default();
    events.normal(Kind::PipelineJob, &key("x"), "WorkloadSubmitted", "Workload submitted");
    assert!(events.for_object(Kind::PipelineRun, &key("x")).is_empty());
}

#[test]
fn queue_coalesces_pending_duplicates() {
    let mut queue = WorkQueue::new();
    let run = WorkItem::new(Kind::PipelineRun, key("r1"));
    let job = WorkItem::new(Kind::PipelineJob, key("r1"));

    assert!(queue.push(run.clone()));
    assert!(!queue.push(run.clone()));
    assert!(queue.push(job.clone()), "same key, different kind");
    assert_eq!(queue.len(), 2);

    assert_eq!(queue.pop(), Some(run.clone()));
    assert!(queue.push(run.clone()), "popped items can be queued again");
    assert_eq!(queue.pop(), Some(job));
    assert_eq!(queue.pop(), Some(run));
    assert!(queue.is_empty());
    assert_eq!(queue.pop(), None);
}
