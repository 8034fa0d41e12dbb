// src/api/service_account.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Workload identity named by a step's `service_account_name`.
///
/// `annotations` binds the identity to a cloud IAM principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}
