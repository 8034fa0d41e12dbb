// tests/config.rs

mod common;
use crate::common::{write_manifest, TestResult};

use std::time::Duration;

use pipeline_operator::config::{load_and_validate, load_from_str, parse_duration, Manifest};
use pipeline_operator::errors::OperatorError;
use pipeline_operator::status::ConditionKey;

const ETL: &str = r#"
[operator]
namespace = "pipelines"
resync_interval = "500ms"
volume_size_gb = 5

[[definition]]
name = "etl"
version = "1.2.0"
description = "extract, transform, load"

[[definition.step]]
id = "extract"
image = "bash"
command = ["sh", "-c", "echo data > output/raw.txt"]
config = { source = "s3://bucket", rows = 100 }

[[definition.step]]
id = "load"
image = "bash"
command = ["sh", "-c", "cat input/raw.txt"]
inputs = ["raw.txt"]
backoff_limit = 2
active_deadline_seconds = 60

[[definition.pipe]]
from = "extract:raw.txt"
to = "load:raw.txt"

[[run]]
name = "etl-nightly"
pipeline = "etl"
version = "1.*"

[[run]]
name = "etl-held"
pipeline = "etl"
paused = true
"#;

fn validate(toml: &str) -> Result<Manifest, OperatorError> {
    Manifest::try_from(load_from_str(toml)?)
}

fn expect_config_error(toml: &str, needle: &str) {
    match validate(toml) {
        Err(OperatorError::Config(msg)) => {
            assert!(msg.contains(needle), "error {msg:?} does not mention {needle:?}")
        }
        other => panic!("expected a config error mentioning {needle:?}, got {other:?}"),
    }
}

#[test]
fn full_manifest_loads_from_disk() -> TestResult {
    let (_dir, path) = write_manifest(ETL)?;
    let manifest = load_and_validate(&path)?;

    assert_eq!(manifest.operator.namespace, "pipelines");
    assert_eq!(manifest.resync_interval, Duration::from_millis(500));
    let settings = manifest.engine_settings();
    assert_eq!(settings.volume_size_gb, 5);
    assert_eq!(settings.storage_class, "standard");

    let def = &manifest.definitions[0];
    assert_eq!(def.metadata.name, "etl-1.2.0");
    assert_eq!(def.metadata.namespace, "pipelines");
    let structure = &def.spec.structure;
    assert_eq!(structure.steps.len(), 2);
    assert_eq!(structure.pipes.len(), 1);
    assert_eq!(structure.pipes[0].to_string(), "extract:raw.txt -> load:raw.txt");

    let extract = structure.step("extract").ok_or("extract missing")?;
    assert_eq!(
        extract.config,
        Some(serde_json::json!({ "source": "s3://bucket", "rows": 100 }))
    );
    let load = structure.step("load").ok_or("load missing")?;
    assert_eq!(load.job.backoff_limit, Some(2));
    assert_eq!(load.job.active_deadline_seconds, Some(60));

    assert_eq!(manifest.runs.len(), 2);
    assert_eq!(manifest.runs[0].spec.version_pattern, "1.*");
    let held = &manifest.runs[1];
    assert!(held.status.conditions.is_true(&ConditionKey::Paused));
    assert_eq!(held.spec.version_pattern, "");
    Ok(())
}

#[test]
fn defaults_apply_to_minimal_manifest() -> TestResult {
    let manifest = validate(
        r#"
        [[definition]]
        name = "tiny"
        version = "1.0.0"

        [[definition.step]]
        id = "only"
        image = "bash"
        command = ["true"]
        "#,
    )?;
    assert_eq!(manifest.operator.namespace, "default");
    assert_eq!(manifest.resync_interval, Duration::from_secs(2));
    assert_eq!(manifest.operator.volume_size_gb, 10);
    assert!(manifest.runs.is_empty());
    let settings = manifest.engine_settings();
    assert_eq!(settings.iam_annotation, "iam.gke.io/gcp-service-account");
    assert_eq!(settings.iam_principal, "{name}@{namespace}.iam.gserviceaccount.com");
    Ok(())
}

#[test]
fn iam_annotation_is_configurable() -> TestResult {
    let manifest = validate(
        r#"
        [operator]
        iam_annotation = "example.com/principal"
        iam_principal = "etl-bot@{namespace}.example.com"

        [[definition]]
        name = "tiny"
        version = "1.0.0"

        [[definition.step]]
        id = "only"
        image = "bash"
        command = ["true"]
        service_account_name = "etl-bot"
        "#,
    )?;
    let settings = manifest.engine_settings();
    assert_eq!(settings.iam_annotation, "example.com/principal");
    assert_eq!(settings.iam_principal, "etl-bot@{namespace}.example.com");
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = load_and_validate(dir.path().join("nope.toml"));
    assert!(matches!(result, Err(OperatorError::Io(_))));
}

#[test]
fn unknown_fields_are_rejected() {
    let result = validate(
        r#"
        [[definition]]
        name = "x"
        version = "1"
        colour = "blue"
        "#,
    );
    assert!(matches!(result, Err(OperatorError::Toml(_))));
}

#[test]
fn manifest_without_definitions_is_rejected() {
    expect_config_error("[operator]\nnamespace = \"default\"\n", "at least one");
}

#[test]
fn cycles_are_rejected() {
    let result = validate(
        r#"
        [[definition]]
        name = "loop"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.step]]
        id = "b"
        image = "bash"

        [[definition.pipe]]
        from = "a:x"
        to = "b:x"

        [[definition.pipe]]
        from = "b:y"
        to = "a:y"
        "#,
    );
    assert!(matches!(result, Err(OperatorError::DagCycle(_))));
}

#[test]
fn pipes_must_reference_known_steps() {
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.pipe]]
        from = "a:out"
        to = "missing:in"
        "#,
        "unknown step 'missing'",
    );
}

#[test]
fn self_pipes_are_rejected() {
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.pipe]]
        from = "a:out"
        to = "a:in"
        "#,
        "to itself",
    );
}

#[test]
fn malformed_pipe_ends_are_rejected() {
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.pipe]]
        from = "a"
        to = "a:in"
        "#,
        "invalid pipe end",
    );
}

#[test]
fn declared_inputs_must_match_pipes() {
    let base = r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.step]]
        id = "b"
        image = "bash"
        inputs = ["data.csv", "extra.csv"]

        [[definition.pipe]]
        from = "a:out.csv"
        to = "b:data.csv"
        "#;
    expect_config_error(base, "declared input 'extra.csv'");

    let undeclared = base.replace("\"extra.csv\"", "\"other.csv\"").replace(
        "to = \"b:data.csv\"",
        "to = \"b:data.csv\"\n\n        [[definition.pipe]]\n        from = \"a:x\"\n        to = \"b:surprise.csv\"",
    );
    expect_config_error(&undeclared, "undeclared input 'surprise.csv'");
}

#[test]
fn names_must_be_dns_labels() {
    expect_config_error(
        r#"
        [[definition]]
        name = "Bad_Name"
        version = "1.0.0"
        "#,
        "DNS-1123",
    );
    expect_config_error(
        r#"
        [[definition]]
        name = "ok"
        version = "1.0.0"

        [[definition.step]]
        id = "Step One"
        image = "bash"
        "#,
        "DNS-1123",
    );
}

#[test]
fn duplicates_are_rejected() {
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition]]
        name = "p"
        version = "1.0.0"
        "#,
        "declared twice",
    );
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[definition.step]]
        id = "a"
        image = "bash"

        [[definition.step]]
        id = "a"
        image = "bash"
        "#,
        "step 'a' twice",
    );
}

#[test]
fn runs_must_reference_known_pipelines() {
    expect_config_error(
        r#"
        [[definition]]
        name = "p"
        version = "1.0.0"

        [[run]]
        name = "r"
        pipeline = "q"
        "#,
        "unknown pipeline 'q'",
    );
}

#[test]
fn operator_settings_are_checked() {
    let def = "\n[[definition]]\nname = \"p\"\nversion = \"1.0.0\"\n";
    expect_config_error(
        &format!("[operator]\nvolume_size_gb = 0\n{def}"),
        "volume_size_gb",
    );
    expect_config_error(
        &format!("[operator]\nresync_interval = \"soon\"\n{def}"),
        "resync_interval",
    );
    expect_config_error(
        &format!("[operator]\nresync_interval = \"0s\"\n{def}"),
        "must be positive",
    );
    expect_config_error(
        &format!("[operator]\niam_annotation = \"\"\n{def}"),
        "iam_annotation",
    );
}

#[test]
fn durations_parse_with_units() {
    assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
    assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
    assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
    assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    assert!(parse_duration("10").is_err());
    assert!(parse_duration("5d").is_err());
    assert!(parse_duration("").is_err());
}
