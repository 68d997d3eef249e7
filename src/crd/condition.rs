//! # Subscription Conditions
//!
//! The four typed conditions tracked on every Subscription and the helpers
//! used to compare them.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition types required on every Subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionType {
    Subscribed,
    SubscriptionActive,
    ApiRuleStatus,
    WebhookCallStatus,
}

impl ConditionType {
    /// Every required type, in the order conditions are initialized
    pub const ALL: [ConditionType; 4] = [
        ConditionType::Subscribed,
        ConditionType::SubscriptionActive,
        ConditionType::ApiRuleStatus,
        ConditionType::WebhookCallStatus,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Subscribed => "Subscribed",
            ConditionType::SubscriptionActive => "Subscription active",
            ConditionType::ApiRuleStatus => "APIRule status",
            ConditionType::WebhookCallStatus => "Webhook call status",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a condition
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Reasons reported on conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionReason {
    SubscriptionCreated,
    SubscriptionCreationFailed,
    SubscriptionActive,
    SubscriptionNotActive,
    SubscriptionDeleted,
    ApiRuleStatusReady,
    ApiRuleStatusNotReady,
    WebhookCallStatus,
}

impl ConditionReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionReason::SubscriptionCreated => "EventMesh Subscription created",
            ConditionReason::SubscriptionCreationFailed => "EventMesh Subscription creation failed",
            ConditionReason::SubscriptionActive => "EventMesh Subscription active",
            ConditionReason::SubscriptionNotActive => "EventMesh Subscription not active",
            ConditionReason::SubscriptionDeleted => "EventMesh Subscription deleted",
            ConditionReason::ApiRuleStatusReady => "APIRule status ready",
            ConditionReason::ApiRuleStatusNotReady => "APIRule status not ready",
            ConditionReason::WebhookCallStatus => {
                "EventMesh Subscription webhook call no errors status"
            }
        }
    }
}

/// A single observation on the Subscription
///
/// The type is kept as a string on the wire so conditions written by other
/// controller versions still deserialize and can be dropped.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: ConditionStatus,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Build a condition stamped with the current time
    #[must_use]
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: Option<ConditionReason>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            r#type: condition_type.as_str().to_string(),
            status,
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: reason.map(|r| r.as_str().to_string()),
            message: (!message.is_empty()).then_some(message),
        }
    }

    #[must_use]
    pub fn is_type(&self, condition_type: ConditionType) -> bool {
        self.r#type == condition_type.as_str()
    }

    /// Compares everything except the transition time
    #[must_use]
    pub fn equals_ignoring_time(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// The conditions of a freshly initialized Subscription, all `Unknown`
#[must_use]
pub fn make_subscription_conditions() -> Vec<Condition> {
    ConditionType::ALL
        .iter()
        .map(|t| Condition::new(*t, ConditionStatus::Unknown, None, ""))
        .collect()
}

/// True when both lists carry exactly the same set of condition types
#[must_use]
pub fn contain_same_condition_types(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().all(|c| b.iter().any(|o| o.r#type == c.r#type))
}

/// True when both lists are equal ignoring transition times
#[must_use]
pub fn conditions_equal(a: &[Condition], b: &[Condition]) -> bool {
    a.len() == b.len()
        && a.iter().all(|c| {
            b.iter()
                .find(|o| o.r#type == c.r#type)
                .is_some_and(|o| o.equals_ignoring_time(c))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_transition_time() {
        let mut a = Condition::new(
            ConditionType::Subscribed,
            ConditionStatus::True,
            Some(ConditionReason::SubscriptionCreated),
            "msg",
        );
        let mut b = a.clone();
        a.last_transition_time = Some("2020-01-01T00:00:00Z".to_string());
        b.last_transition_time = Some("2024-01-01T00:00:00Z".to_string());
        assert!(a.equals_ignoring_time(&b));

        b.status = ConditionStatus::False;
        assert!(!a.equals_ignoring_time(&b));
    }

    #[test]
    fn test_same_condition_types() {
        let expected = make_subscription_conditions();
        let mut reversed = expected.clone();
        reversed.reverse();
        assert!(contain_same_condition_types(&expected, &reversed));

        let mut legacy = expected.clone();
        legacy.pop();
        legacy.push(Condition {
            r#type: "Subscription name".to_string(),
            status: ConditionStatus::True,
            last_transition_time: None,
            reason: None,
            message: None,
        });
        assert!(!contain_same_condition_types(&expected, &legacy));
    }

    #[test]
    fn test_conditions_equal_detects_reason_change() {
        let a = make_subscription_conditions();
        let mut b = a.clone();
        assert!(conditions_equal(&a, &b));
        b[2].reason = Some(ConditionReason::ApiRuleStatusReady.as_str().to_string());
        assert!(!conditions_equal(&a, &b));
    }

    #[test]
    fn test_empty_message_is_omitted() {
        let c = Condition::new(ConditionType::ApiRuleStatus, ConditionStatus::True, None, "");
        assert_eq!(c.message, None);
        assert_eq!(c.r#type, "APIRule status");
    }
}
