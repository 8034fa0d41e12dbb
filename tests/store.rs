// tests/store.rs

mod common;
use crate::common::{linear_pipeline, RunBuilder, TestResult, NAMESPACE};

use tokio::sync::mpsc;

use pipeline_operator::api::{
    Kind, ObjectKey, ObjectMeta, PipelineRun, Record, StepConfig,
};
use pipeline_operator::engine::RuntimeEvent;
use pipeline_operator::store::{Change, MemoryStore, Store, StoreError};

fn config_owned_by(run: &PipelineRun, name: &str) -> StepConfig {
    StepConfig {
        metadata: ObjectMeta::new(NAMESPACE, name).owned_by(run),
        data: Default::default(),
    }
}

#[test]
fn create_assigns_versions_and_rejects_duplicates() -> TestResult {
    let store = MemoryStore::new();
    let run = RunBuilder::new("r1", "lin").build();

    let created = store.create(&run)?;
    assert!(created.metadata.resource_version > 0);
    assert_eq!(
        store.create(&run),
        Err(StoreError::AlreadyExists {
            kind: Kind::PipelineRun,
            key: run.key()
        })
    );
    Ok(())
}

#[test]
fn stale_update_is_a_conflict() -> TestResult {
    let store = MemoryStore::new();
    let created = store.create(&RunBuilder::new("r1", "lin").build())?;

    let mut first = created.clone();
    first.status.phase = Some("first".to_string());
    let stored = store.update(&first)?;
    assert!(stored.metadata.resource_version > created.metadata.resource_version);

    let mut second = created;
    second.status.phase = Some("second".to_string());
    let err = store.update(&second).expect_err("stale write must be rejected");
    assert!(matches!(err, StoreError::Conflict { expected, actual, .. } if expected < actual));

    let current: PipelineRun = store.get(&ObjectKey::new(NAMESPACE, "r1"))?.ok_or("run missing")?;
    assert_eq!(current.status.phase.as_deref(), Some("first"));
    Ok(())
}

#[test]
fn update_of_missing_record_is_not_found() {
    let store = MemoryStore::new();
    let run = RunBuilder::new("ghost", "lin").build();
    assert!(matches!(store.update(&run), Err(StoreError::NotFound { .. })));
}

#[test]
fn reads_are_isolated_copies() -> TestResult {
    let store = MemoryStore::new();
    store.create(&RunBuilder::new("r1", "lin").build())?;

    let key = ObjectKey::new(NAMESPACE, "r1");
    let mut copy: PipelineRun = store.get(&key)?.ok_or("run missing")?;
    copy.status.phase = Some("local only".to_string());

    let fresh: PipelineRun = store.get(&key)?.ok_or("run missing")?;
    assert_eq!(fresh.status.phase, None);
    Ok(())
}

#[test]
fn list_is_scoped_to_namespace_and_ordered() -> TestResult {
    let store = MemoryStore::new();
    for name in ["r3", "r1", "r2"] {
        store.create(&RunBuilder::new(name, "lin").build())?;
    }
    let mut elsewhere = RunBuilder::new("r0", "lin").build();
    elsewhere.metadata.namespace = "other".to_string();
    store.create(&elsewhere)?;

    let names: Vec<String> = store
        .list::<PipelineRun>(NAMESPACE)?
        .into_iter()
        .map(|r| r.metadata.name)
        .collect();
    assert_eq!(names, vec!["r1", "r2", "r3"]);
    assert!(store.list::<StepConfig>(NAMESPACE)?.is_empty());
    Ok(())
}

#[test]
fn delete_cascades_transitively() -> TestResult {
    let store = MemoryStore::new();
    let run = store.create(&RunBuilder::new("r1", "lin").build())?;
    let other = store.create(&RunBuilder::new("r2", "lin").build())?;
    store.create(&config_owned_by(&run, "child"))?;
    store.create(&config_owned_by(&other, "unrelated"))?;

    // A grandchild owned by the child record.
    let child: StepConfig = store
        .get(&ObjectKey::new(NAMESPACE, "child"))?
        .ok_or("child missing")?;
    let mut grandchild = config_owned_by(&run, "grandchild");
    grandchild.metadata = ObjectMeta::new(NAMESPACE, "grandchild").owned_by(&child);
    store.create(&grandchild)?;

    assert!(store.delete::<PipelineRun>(&run.key())?);
    assert_eq!(store.count(Kind::StepConfig), 1);
    assert!(store.get::<StepConfig>(&ObjectKey::new(NAMESPACE, "unrelated"))?.is_some());
    assert!(!store.delete::<PipelineRun>(&run.key())?, "already gone");
    Ok(())
}

#[test]
fn injected_failures_are_consumed_per_kind() -> TestResult {
    let store = MemoryStore::new();
    store.inject_write_failures(Kind::PipelineRun, 2);
    store.create(&linear_pipeline("lin"))?;

    let run = RunBuilder::new("r1", "lin").build();
    assert!(matches!(store.create(&run), Err(StoreError::Unavailable(_))));
    assert!(matches!(store.create(&run), Err(StoreError::Unavailable(_))));
    store.create(&run)?;
    assert_eq!(store.count(Kind::PipelineRun), 1);
    Ok(())
}

#[test]
fn every_change_is_announced() -> TestResult {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let store = MemoryStore::with_notifier(tx);

    let run = store.create(&RunBuilder::new("r1", "lin").build())?;
    store.create(&config_owned_by(&run, "cfg"))?;
    store.update(&run)?;
    store.delete::<PipelineRun>(&run.key())?;

    let mut seen = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let RuntimeEvent::RecordChanged { kind, key, change } = event {
            seen.push((kind, key.name, change));
        }
    }
    assert_eq!(
        seen,
        vec![
            (Kind::PipelineRun, "r1".to_string(), Change::Created),
            (Kind::StepConfig, "cfg".to_string(), Change::Created),
            (Kind::PipelineRun, "r1".to_string(), Change::Updated),
            (Kind::PipelineRun, "r1".to_string(), Change::Deleted),
            (Kind::StepConfig, "cfg".to_string(), Change::Deleted),
        ]
    );
    Ok(())
}
