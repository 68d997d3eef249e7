//! # Subscription Status
//!
//! Status types written exclusively by the controller.

use crate::crd::condition::{
    conditions_equal, make_subscription_conditions, Condition, ConditionReason, ConditionStatus,
    ConditionType,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the Subscription resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// True when every condition is True
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Event types after cleaning
    #[serde(default)]
    pub types: Vec<EventType>,
    /// Backend specific bookkeeping
    #[serde(default)]
    pub backend: Backend,
}

/// Original event type next to its cleaned form
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    pub original_type: String,
    pub clean_type: String,
}

/// Original event type next to the type registered on EventMesh
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventMeshTypes {
    pub original_type: String,
    pub event_mesh_type: String,
}

/// EventMesh related state of a Subscription
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    /// Hash of the full desired EventMesh subscription
    #[serde(default)]
    pub ev2hash: i64,
    /// Hash of the cleaned view returned by the EventMesh server
    #[serde(default)]
    pub event_mesh_hash: i64,
    /// Hash of the desired EventMesh subscription without its webhook auth
    #[serde(default)]
    pub event_mesh_local_hash: i64,
    /// Hash of the desired webhook auth block
    #[serde(default)]
    pub webhook_auth_hash: i64,
    /// Name of the APIRule exposing the sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_rule_name: Option<String>,
    /// Sink as reachable from outside the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sink: Option<String>,
    /// First time the EventMesh subscription was seen inactive (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_activation: Option<String>,
    #[serde(default)]
    pub ems_types: Vec<EventMeshTypes>,
    /// Mirror of the EventMesh subscription status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ems_subscription_status: Option<EventMeshSubscriptionStatus>,
}

/// Status of the subscription as reported by EventMesh
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventMeshSubscriptionStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_reason: String,
    #[serde(default)]
    pub last_successful_delivery: String,
    #[serde(default)]
    pub last_failed_delivery: String,
    #[serde(default)]
    pub last_failed_delivery_reason: String,
}

impl SubscriptionStatus {
    /// Status every Subscription starts with
    #[must_use]
    pub fn initial() -> Self {
        Self {
            conditions: make_subscription_conditions(),
            ..Default::default()
        }
    }

    /// True when every condition is True
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.conditions
            .iter()
            .all(|c| c.status == ConditionStatus::True)
    }

    /// True when the stored `ready` flag disagrees with the conditions
    #[must_use]
    pub fn should_update_ready_status(&self) -> bool {
        self.ready != self.is_ready()
    }

    #[must_use]
    pub fn find_condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.is_type(condition_type))
    }

    /// Drops the cached clean types, a new EventMesh registration starts over
    pub fn initialize_event_types(&mut self) {
        self.types = Vec::new();
    }

    /// Derive the `APIRule status` condition from the outcome of the APIRule sync
    #[must_use]
    pub fn api_rule_condition(error: Option<&str>) -> Condition {
        match error {
            None => Condition::new(
                ConditionType::ApiRuleStatus,
                ConditionStatus::True,
                Some(ConditionReason::ApiRuleStatusReady),
                "",
            ),
            Some(message) => Condition::new(
                ConditionType::ApiRuleStatus,
                ConditionStatus::False,
                Some(ConditionReason::ApiRuleStatusNotReady),
                message,
            ),
        }
    }

    /// Equality that ignores condition transition times
    #[must_use]
    pub fn equals_ignoring_time(&self, other: &SubscriptionStatus) -> bool {
        self.ready == other.ready
            && conditions_equal(&self.conditions, &other.conditions)
            && self.types == other.types
            && self.backend == other.backend
    }
}
