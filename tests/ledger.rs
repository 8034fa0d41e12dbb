// tests/ledger.rs

use std::error::Error;

use pipeline_operator::status::{ConditionKey, ConditionStatus, Ledger, StepCounts};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn set_is_a_no_op_when_status_already_holds() {
    let mut ledger = Ledger::new();
    assert!(ledger.set(ConditionKey::step_success("a"), ConditionStatus::Unknown, "started"));
    assert!(!ledger.set(ConditionKey::step_success("a"), ConditionStatus::Unknown, "again"));
    assert_eq!(
        ledger.get(&ConditionKey::step_success("a")).map(|c| c.message.as_str()),
        Some("started"),
        "a no-op set keeps the original message"
    );

    assert!(ledger.set(ConditionKey::step_success("a"), ConditionStatus::True, "done"));
    assert!(ledger.is_true(&ConditionKey::step_success("a")));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn step_counts_only_look_at_step_conditions() {
    let mut ledger = Ledger::new();
    ledger.set(ConditionKey::VersionDetermined, ConditionStatus::True, "v");
    ledger.set(ConditionKey::volume("a"), ConditionStatus::True, "pvc");
    ledger.set(ConditionKey::step_success("a"), ConditionStatus::True, "");
    ledger.set(ConditionKey::step_success("b"), ConditionStatus::Unknown, "");
    ledger.set(ConditionKey::step_success("c"), ConditionStatus::Unknown, "");
    ledger.set(ConditionKey::step_success("d"), ConditionStatus::False, "");

    assert_eq!(
        ledger.step_counts(),
        StepCounts {
            active: 2,
            succeeded: 1,
            failed: 1
        }
    );
    assert_eq!(ledger.step_counts().to_string(), "2/1/1");
}

#[test]
fn merge_reports_changes_and_lets_the_other_side_win() {
    let mut ours = Ledger::new();
    ours.set(ConditionKey::step_success("a"), ConditionStatus::Unknown, "");
    ours.set(ConditionKey::Paused, ConditionStatus::False, "");

    let mut theirs = Ledger::new();
    theirs.set(ConditionKey::step_success("a"), ConditionStatus::True, "");
    theirs.set(ConditionKey::Paused, ConditionStatus::False, "");

    assert!(ours.merge(&theirs));
    assert!(ours.is_true(&ConditionKey::step_success("a")));
    assert!(!ours.merge(&theirs), "merging twice changes nothing");
}

#[test]
fn keys_serialize_in_their_wire_form() -> TestResult {
    let mut ledger = Ledger::new();
    ledger.set(ConditionKey::step_success("extract"), ConditionStatus::True, "ok");
    ledger.set(ConditionKey::volume("extract"), ConditionStatus::False, "gone");
    ledger.set(ConditionKey::StructureLoaded, ConditionStatus::True, "loaded");

    let value = serde_json::to_value(&ledger)?;
    let object = value.as_object().ok_or("ledger is not a map")?;
    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["StructureLoaded", "pvc-extract", "success-extract"]);
    assert_eq!(value["success-extract"]["status"], "True");

    let back: Ledger = serde_json::from_value(value)?;
    assert_eq!(back, ledger);
    Ok(())
}

#[test]
fn condition_keys_parse_from_strings() {
    assert_eq!("pvc-load".parse::<ConditionKey>(), Ok(ConditionKey::volume("load")));
    assert_eq!("success-a-b".parse::<ConditionKey>(), Ok(ConditionKey::step_success("a-b")));
    assert_eq!("JobSucceeded".parse::<ConditionKey>(), Ok(ConditionKey::JobSucceeded));
    assert!("bogus".parse::<ConditionKey>().is_err());
}
