// src/engine/definition_controller.rs

//! Delivers per-step configuration of a definition as a [`StepConfig`]
//! record named after the definition, then provisions one
//! [`ServiceAccount`] per distinct `service_account_name` its steps use.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::api::{
    standard_labels, Kind, ObjectKey, ObjectMeta, PipelineDefinition, Record, ServiceAccount,
    StepConfig,
};
use crate::errors::{OperatorError, Result};
use crate::exec::WorkloadExecutor;
use crate::store::Store;

use super::{Action, Engine, PassOutcome};

/// Entry for steps that carry no configuration.
pub const EMPTY_CONFIG: &str = "{}";

/// One JSON document per step, keyed by step id.
pub fn step_config_data(definition: &PipelineDefinition) -> Result<BTreeMap<String, String>> {
    definition
        .spec
        .structure
        .steps
        .iter()
        .map(|step| {
            let doc = match &step.config {
                Some(config) => serde_json::to_string(config).map_err(|e| {
                    OperatorError::Config(format!(
                        "config of step {} is not serializable: {e}",
                        step.id
                    ))
                })?,
                None => EMPTY_CONFIG.to_string(),
            };
            Ok((step.id.clone(), doc))
        })
        .collect()
}

/// Distinct service account names referenced by the steps, sorted.
pub fn service_account_names(definition: &PipelineDefinition) -> BTreeSet<&str> {
    definition
        .spec
        .structure
        .steps
        .iter()
        .filter_map(|step| step.job.service_account_name.as_deref())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Substitute `{name}` and `{namespace}` in an IAM principal template.
pub fn iam_principal(template: &str, namespace: &str, name: &str) -> String {
    template
        .replace("{namespace}", namespace)
        .replace("{name}", name)
}

impl<S: Store, E: WorkloadExecutor> Engine<S, E> {
    /// Create or refresh the step configuration record of a definition, then
    /// create the first missing service account.
    pub fn reconcile_definition(&self, key: &ObjectKey) -> Result<PassOutcome> {
        let Some(definition) = self.store().get::<PipelineDefinition>(key)? else {
            return Ok(PassOutcome::Missing);
        };
        if let Some(action) = self.deliver_step_config(&definition)? {
            return Ok(PassOutcome::Acted(action));
        }
        if let Some(action) = self.provision_service_account(&definition)? {
            return Ok(PassOutcome::Acted(action));
        }
        debug!(definition = %key, "definition up to date");
        Ok(PassOutcome::Idle)
    }

    fn deliver_step_config(&self, definition: &PipelineDefinition) -> Result<Option<Action>> {
        let key = definition.key();
        let data = step_config_data(definition)?;

        match self.store().get::<StepConfig>(&key)? {
            None => {
                let config = StepConfig {
                    metadata: ObjectMeta::new(key.namespace.clone(), key.name.clone())
                        .owned_by(definition)
                        .with_labels(standard_labels("step-config", &definition.spec.name)),
                    data,
                };
                self.store().create(&config)?;
                info!(definition = %key, steps = config.data.len(), "created step config");
                Ok(Some(Action::ConfigDelivered))
            }
            Some(mut existing) if existing.data != data => {
                existing.data = data;
                self.store().update(&existing)?;
                info!(definition = %key, "updated step config");
                Ok(Some(Action::ConfigDelivered))
            }
            Some(_) => Ok(None),
        }
    }

    /// Existing accounts are left alone, whoever owns them.
    fn provision_service_account(&self, definition: &PipelineDefinition) -> Result<Option<Action>> {
        let namespace = &definition.metadata.namespace;
        for name in service_account_names(definition) {
            let key = ObjectKey::new(namespace.clone(), name);
            if self.store().get::<ServiceAccount>(&key)?.is_some() {
                continue;
            }

            let settings = self.settings();
            let principal = iam_principal(&settings.iam_principal, namespace, name);
            let account = ServiceAccount {
                metadata: ObjectMeta::new(namespace.clone(), name)
                    .owned_by(definition)
                    .with_labels(standard_labels("service-account", name)),
                annotations: BTreeMap::from([(settings.iam_annotation.clone(), principal)]),
            };
            self.store().create(&account)?;
            info!(definition = %definition.key(), account = %key, "created service account");
            self.events().normal(
                Kind::PipelineDefinition,
                &definition.key(),
                "ServiceAccountCreated",
                format!("Created service account {name}"),
            );
            return Ok(Some(Action::ServiceAccountCreated(name.to_string())));
        }
        Ok(None)
    }
}
