#![allow(dead_code)]

use serde_json::Value;

use pipeline_operator::api::{
    JobTemplate, Pipe, PipeEnd, PipelineDefinition, PipelineDefinitionSpec, PipelineRun,
    PipelineRunSpec, PipelineStructure, StepSpec,
};
use pipeline_operator::status::{ConditionKey, ConditionStatus};

pub const NAMESPACE: &str = "default";

/// Builder for `PipelineDefinition` to simplify test setup.
pub struct DefinitionBuilder {
    spec: PipelineDefinitionSpec,
}

impl DefinitionBuilder {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            spec: PipelineDefinitionSpec {
                name: name.to_string(),
                version: version.to_string(),
                description: None,
                structure: PipelineStructure::default(),
            },
        }
    }

    pub fn step(mut self, step: StepBuilder) -> Self {
        self.spec.structure.steps.push(step.build());
        self
    }

    /// Add plain steps with default templates.
    pub fn steps(mut self, ids: &[&str]) -> Self {
        for id in ids {
            self.spec.structure.steps.push(StepBuilder::new(id).build());
        }
        self
    }

    /// `from` and `to` are `"<step>:<file>"`.
    pub fn pipe(mut self, from: &str, to: &str) -> Self {
        let from: PipeEnd = from.parse().expect("valid pipe source");
        let to: PipeEnd = to.parse().expect("valid pipe target");
        self.spec.structure.pipes.push(Pipe::new(from, to));
        self
    }

    pub fn build(self) -> PipelineDefinition {
        PipelineDefinition::new(NAMESPACE, self.spec)
    }
}

/// Builder for `StepSpec`.
pub struct StepBuilder {
    step: StepSpec,
}

impl StepBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            step: StepSpec {
                id: id.to_string(),
                description: None,
                inputs: vec![],
                config: None,
                job: JobTemplate {
                    image: "busybox".to_string(),
                    command: vec!["sh".to_string(), "-c".to_string(), format!("echo {id}")],
                    ..JobTemplate::default()
                },
            },
        }
    }

    pub fn image(mut self, image: &str) -> Self {
        self.step.job.image = image.to_string();
        self
    }

    /// Shell script run with `sh -c`.
    pub fn script(mut self, script: &str) -> Self {
        self.step.job.command = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        self
    }

    pub fn input(mut self, name: &str) -> Self {
        self.step.inputs.push(name.to_string());
        self
    }

    pub fn config(mut self, config: Value) -> Self {
        self.step.config = Some(config);
        self
    }

    pub fn backoff_limit(mut self, limit: i32) -> Self {
        self.step.job.backoff_limit = Some(limit);
        self
    }

    pub fn active_deadline_seconds(mut self, secs: i64) -> Self {
        self.step.job.active_deadline_seconds = Some(secs);
        self
    }

    pub fn service_account(mut self, name: &str) -> Self {
        self.step.job.service_account_name = Some(name.to_string());
        self
    }

    pub fn volume_size_gb(mut self, size: u64) -> Self {
        self.step.job.volume_size_gb = Some(size);
        self
    }

    pub fn build(self) -> StepSpec {
        self.step
    }
}

/// Builder for `PipelineRun`.
pub struct RunBuilder {
    run: PipelineRun,
}

impl RunBuilder {
    pub fn new(name: &str, pipeline: &str) -> Self {
        Self {
            run: PipelineRun::new(
                NAMESPACE,
                name,
                PipelineRunSpec {
                    pipeline_name: pipeline.to_string(),
                    version_pattern: String::new(),
                    description: None,
                },
            ),
        }
    }

    pub fn version(mut self, pattern: &str) -> Self {
        self.run.spec.version_pattern = pattern.to_string();
        self
    }

    pub fn paused(mut self) -> Self {
        self.run
            .status
            .conditions
            .set(ConditionKey::Paused, ConditionStatus::True, "paused by test");
        self
    }

    pub fn build(self) -> PipelineRun {
        self.run
    }
}

/// `a -> b -> c`, each pipe carrying `out.txt` to `in.txt`.
pub fn linear_pipeline(name: &str) -> PipelineDefinition {
    DefinitionBuilder::new(name, "1.0.0")
        .steps(&["a", "b", "c"])
        .pipe("a:out.txt", "b:in.txt")
        .pipe("b:out.txt", "c:in.txt")
        .build()
}

/// `a -> {b, c} -> d`.
pub fn diamond_pipeline(name: &str) -> PipelineDefinition {
    DefinitionBuilder::new(name, "1.0.0")
        .steps(&["a", "b", "c", "d"])
        .pipe("a:out.txt", "b:in.txt")
        .pipe("a:out.txt", "c:in.txt")
        .pipe("b:out.txt", "d:left.txt")
        .pipe("c:out.txt", "d:right.txt")
        .build()
}
