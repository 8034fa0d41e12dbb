// src/config/validate.rs

use std::collections::{BTreeSet, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::api::{Pipe, PipeEnd};
use crate::config::model::{parse_duration, DefinitionConfig, Manifest, RawManifest};
use crate::errors::{OperatorError, Result};

/// Lower-case alphanumerics and `-`, starting and ending alphanumeric.
const DNS_LABEL: &str = r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$";

/// Versions may additionally contain dots and upper-case letters.
const VERSION: &str = r"^[0-9A-Za-z][-.0-9A-Za-z]*$";

fn matches(pattern: &str, value: &str) -> Result<bool> {
    let re = Regex::new(pattern)
        .map_err(|e| config_error(format!("invalid validation pattern {pattern}: {e}")))?;
    Ok(re.is_match(value))
}

impl TryFrom<RawManifest> for Manifest {
    type Error = OperatorError;

    fn try_from(raw: RawManifest) -> std::result::Result<Self, Self::Error> {
        ensure_has_definitions(&raw)?;
        let resync_interval = validate_operator(&raw)?;

        let namespace = raw.operator.namespace.clone();
        let mut definitions = Vec::with_capacity(raw.definitions.len());
        let mut seen = HashSet::new();
        for def in &raw.definitions {
            if !seen.insert((def.name.as_str(), def.version.as_str())) {
                return Err(config_error(format!(
                    "definition '{}' version '{}' is declared twice",
                    def.name, def.version
                )));
            }
            let pipes = validate_definition(def)?;
            definitions.push(def.to_definition(&namespace, pipes)?);
        }

        let runs = validate_runs(&raw)?
            .into_iter()
            .map(|run| run.to_run(&namespace))
            .collect();

        Ok(Manifest::new_unchecked(
            raw.operator,
            resync_interval,
            definitions,
            runs,
        ))
    }
}

fn config_error(msg: impl Into<String>) -> OperatorError {
    OperatorError::Config(msg.into())
}

fn check_label(what: &str, value: &str) -> Result<()> {
    if matches(DNS_LABEL, value)? {
        Ok(())
    } else {
        Err(config_error(format!(
            "{what} '{value}' must be a DNS-1123 label (lower-case alphanumerics and '-', at most 63 characters)"
        )))
    }
}

fn ensure_has_definitions(raw: &RawManifest) -> Result<()> {
    if raw.definitions.is_empty() {
        return Err(config_error(
            "manifest must contain at least one [[definition]] section",
        ));
    }
    Ok(())
}

fn validate_operator(raw: &RawManifest) -> Result<std::time::Duration> {
    check_label("[operator].namespace", &raw.operator.namespace)?;
    if raw.operator.volume_size_gb == 0 {
        return Err(config_error("[operator].volume_size_gb must be >= 1 (got 0)"));
    }
    if raw.operator.iam_annotation.trim().is_empty() {
        return Err(config_error("[operator].iam_annotation must not be empty"));
    }
    let interval = parse_duration(&raw.operator.resync_interval)
        .map_err(|e| config_error(format!("[operator].resync_interval: {e}")))?;
    if interval.is_zero() {
        return Err(config_error("[operator].resync_interval must be positive"));
    }
    Ok(interval)
}

/// Validate one definition and return its parsed pipes.
fn validate_definition(def: &DefinitionConfig) -> Result<Vec<Pipe>> {
    check_label("definition name", &def.name)?;
    if !matches(VERSION, &def.version)? {
        return Err(config_error(format!(
            "definition '{}' has invalid version '{}'",
            def.name, def.version
        )));
    }

    let mut ids = HashSet::new();
    for step in &def.steps {
        check_label(&format!("step id in definition '{}'", def.name), &step.id)?;
        if !ids.insert(step.id.as_str()) {
            return Err(config_error(format!(
                "definition '{}' declares step '{}' twice",
                def.name, step.id
            )));
        }
        if step.image.trim().is_empty() {
            return Err(config_error(format!(
                "step '{}' in definition '{}' has an empty image",
                step.id, def.name
            )));
        }
        if step.volume_size_gb == Some(0) {
            return Err(config_error(format!(
                "step '{}' in definition '{}': volume_size_gb must be >= 1",
                step.id, def.name
            )));
        }
    }

    let mut pipes = Vec::with_capacity(def.pipes.len());
    for entry in &def.pipes {
        let from: PipeEnd = entry.from.parse().map_err(config_error)?;
        let to: PipeEnd = entry.to.parse().map_err(config_error)?;
        for end in [&from, &to] {
            if !ids.contains(end.step_id.as_str()) {
                return Err(config_error(format!(
                    "pipe {} -> {} in definition '{}' references unknown step '{}'",
                    entry.from, entry.to, def.name, end.step_id
                )));
            }
        }
        if from.step_id == to.step_id {
            return Err(config_error(format!(
                "pipe {} -> {} in definition '{}' connects step '{}' to itself",
                entry.from, entry.to, def.name, from.step_id
            )));
        }
        pipes.push(Pipe::new(from, to));
    }

    validate_declared_inputs(def, &pipes)?;
    validate_dag(def, &pipes)?;
    Ok(pipes)
}

/// A step that declares inputs must be fed exactly those names.
fn validate_declared_inputs(def: &DefinitionConfig, pipes: &[Pipe]) -> Result<()> {
    for step in def.steps.iter().filter(|s| !s.inputs.is_empty()) {
        let declared: BTreeSet<&str> = step.inputs.iter().map(String::as_str).collect();
        let fed: BTreeSet<&str> = pipes
            .iter()
            .filter(|p| p.to.step_id == step.id)
            .map(|p| p.to.name.as_str())
            .collect();

        if let Some(unknown) = fed.difference(&declared).next() {
            return Err(config_error(format!(
                "step '{}' in definition '{}' receives undeclared input '{}'",
                step.id, def.name, unknown
            )));
        }
        if let Some(missing) = declared.difference(&fed).next() {
            return Err(config_error(format!(
                "declared input '{}' of step '{}' in definition '{}' is not fed by any pipe",
                missing, step.id, def.name
            )));
        }
    }
    Ok(())
}

fn validate_dag(def: &DefinitionConfig, pipes: &[Pipe]) -> Result<()> {
    // Edge direction: producer -> consumer.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for step in &def.steps {
        graph.add_node(step.id.as_str());
    }
    for pipe in pipes {
        graph.add_edge(pipe.from.step_id.as_str(), pipe.to.step_id.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(OperatorError::DagCycle(format!(
            "cycle detected in definition '{}' involving step '{}'",
            def.name,
            cycle.node_id()
        ))),
    }
}

fn validate_runs(raw: &RawManifest) -> Result<Vec<&crate::config::model::RunConfig>> {
    let pipelines: HashSet<&str> = raw.definitions.iter().map(|d| d.name.as_str()).collect();
    let mut names = HashSet::new();
    for run in &raw.runs {
        check_label("run name", &run.name)?;
        if !names.insert(run.name.as_str()) {
            return Err(config_error(format!("run '{}' is declared twice", run.name)));
        }
        if !pipelines.contains(run.pipeline.as_str()) {
            return Err(config_error(format!(
                "run '{}' references unknown pipeline '{}'",
                run.name, run.pipeline
            )));
        }
    }
    Ok(raw.runs.iter().collect())
}
