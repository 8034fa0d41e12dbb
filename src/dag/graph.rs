// src/dag/graph.rs

use std::collections::HashMap;

use crate::api::{Pipe, PipelineStructure, StepSpec};

/// Internal node structure: indices of the pipes entering and leaving a step.
#[derive(Debug, Clone, Default)]
struct StepNode {
    /// Pipes whose target is this step, in pipe order.
    inputs: Vec<usize>,
    /// Pipes whose source is this step, in pipe order.
    outputs: Vec<usize>,
}

/// Pipe resolver over a pipeline structure.
///
/// This is intentionally lightweight; acyclicity is validated when a
/// definition is loaded, so here we only keep adjacency information for
/// scheduling and reclaiming. Steps are always reported in definition order
/// and pipes in pipe order, which keeps every "first match" decision
/// reproducible.
#[derive(Debug, Clone)]
pub struct PipeGraph<'a> {
    structure: &'a PipelineStructure,
    nodes: HashMap<&'a str, StepNode>,
}

impl<'a> PipeGraph<'a> {
    pub fn new(structure: &'a PipelineStructure) -> Self {
        let mut nodes: HashMap<&'a str, StepNode> = structure
            .steps
            .iter()
            .map(|s| (s.id.as_str(), StepNode::default()))
            .collect();

        for (idx, pipe) in structure.pipes.iter().enumerate() {
            nodes
                .entry(pipe.to.step_id.as_str())
                .or_default()
                .inputs
                .push(idx);
            nodes
                .entry(pipe.from.step_id.as_str())
                .or_default()
                .outputs
                .push(idx);
        }

        Self { structure, nodes }
    }

    pub fn structure(&self) -> &'a PipelineStructure {
        self.structure
    }

    /// All steps in definition order.
    pub fn steps(&self) -> std::slice::Iter<'a, StepSpec> {
        self.structure.steps.iter()
    }

    pub fn step(&self, id: &str) -> Option<&'a StepSpec> {
        self.structure.step(id)
    }

    /// Pipes whose target is `step`.
    pub fn inputs_of(&self, step: &str) -> impl Iterator<Item = &'a Pipe> + '_ {
        let pipes = &self.structure.pipes;
        self.nodes
            .get(step)
            .map(|n| n.inputs.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &pipes[i])
    }

    /// Pipes whose source is `step`.
    pub fn outputs_of(&self, step: &str) -> impl Iterator<Item = &'a Pipe> + '_ {
        let pipes = &self.structure.pipes;
        self.nodes
            .get(step)
            .map(|n| n.outputs.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &pipes[i])
    }

    /// Distinct upstream steps of `step`, in first-pipe order.
    pub fn upstream_of(&self, step: &str) -> Vec<&'a str> {
        let mut seen = Vec::new();
        for pipe in self.inputs_of(step) {
            let from = pipe.from.step_id.as_str();
            if !seen.contains(&from) {
                seen.push(from);
            }
        }
        seen
    }

    /// Distinct downstream steps of `step`, in first-pipe order.
    pub fn downstream_of(&self, step: &str) -> Vec<&'a str> {
        let mut seen = Vec::new();
        for pipe in self.outputs_of(step) {
            let to = pipe.to.step_id.as_str();
            if !seen.contains(&to) {
                seen.push(to);
            }
        }
        seen
    }
}
