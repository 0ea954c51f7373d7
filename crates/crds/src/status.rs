//! Shared status subresource
//!
//! Every Auth0 resource reports the remote identity that backs it and a snapshot of the
//! configuration last applied remotely. External tooling reads these fields as the
//! operator's public contract.

use crate::passthrough::PassthroughDocument;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type reporting whether remote state matches the declaration
pub const CONDITION_READY: &str = "Ready";

/// Condition type raised once transient failures outlive the staleness budget
pub const CONDITION_FAILING: &str = "Failing";

/// Observed state of an Auth0 resource
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    /// Remote Auth0 id, set after a successful create or adoption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Remote identifier for kinds that carry one (resource server audience)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Configuration last applied remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_conf: Option<PassthroughDocument>,

    /// Reconciliation conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<StatusCondition>,

    /// Generation of the spec last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition {
    /// Condition type (`Ready`, `Failing`)
    #[serde(rename = "type")]
    pub type_: String,

    /// `True`, `False` or `Unknown`
    pub status: String,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition changed status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl StatusCondition {
    /// Build a condition with the given type and boolean status
    #[must_use]
    pub fn new(type_: &str, status: bool, reason: &str, message: Option<String>) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            reason: Some(reason.to_string()),
            message,
            last_transition_time: Some(chrono::Utc::now()),
        }
    }

    /// Whether the condition status is `True`
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

impl EntityStatus {
    /// Look up a condition by type
    #[must_use]
    pub fn condition(&self, type_: &str) -> Option<&StatusCondition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or replace a condition, keeping the previous transition time when the
    /// status value did not change
    pub fn set_condition(&mut self, mut condition: StatusCondition) {
        if let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_conf_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": "cl_1",
            "lastConf": {"name": "web", "addons": {"samlp": {"audience": "x"}}, "vendor_flag": [1, 2]}
        });
        let status: EntityStatus = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&status).unwrap(), raw);
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_unchanged() {
        let mut status = EntityStatus::default();
        let mut first = StatusCondition::new(CONDITION_READY, true, "Settled", None);
        let stamp = chrono::Utc::now() - chrono::Duration::minutes(10);
        first.last_transition_time = Some(stamp);
        status.set_condition(first);

        status.set_condition(StatusCondition::new(CONDITION_READY, true, "Settled", None));
        let ready = status.condition(CONDITION_READY).unwrap();
        assert_eq!(ready.last_transition_time, Some(stamp));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_set_condition_replaces_on_transition() {
        let mut status = EntityStatus::default();
        status.set_condition(StatusCondition::new(CONDITION_READY, true, "Settled", None));
        status.set_condition(StatusCondition::new(
            CONDITION_READY,
            false,
            "Blocked",
            Some("waiting".to_string()),
        ));
        let ready = status.condition(CONDITION_READY).unwrap();
        assert!(!ready.is_true());
        assert_eq!(ready.reason.as_deref(), Some("Blocked"));
    }
}
