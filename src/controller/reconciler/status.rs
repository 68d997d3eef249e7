//! # Condition State Machine
//!
//! Every change of a Subscription condition goes through
//! [`replace_status_condition`], which also keeps `ready` in line with the
//! conditions.

use crate::crd::{
    contain_same_condition_types, make_subscription_conditions, Condition, ConditionReason,
    ConditionStatus, ConditionType, EventMeshSubscriptionStatus, Subscription, SubscriptionStatus,
};
use crate::eventmesh::types::SubscriptionState;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::time::Duration;

/// Errors of the status checks
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StatusCheckError {
    #[error("timeout waiting for the subscription to be active: {0}")]
    ActivationTimeout(String),
    #[error("failed to parse FailedActivation: {0}")]
    FailedActivation(String),
    #[error("failed to parse LastFailedDelivery: {0}")]
    LastFailedDelivery(String),
    #[error("failed to parse LastSuccessfulDelivery: {0}")]
    LastSuccessfulDelivery(String),
}

/// Replaces the condition of the same type and recomputes `ready`
///
/// Returns true when anything changed. A type missing from the status is
/// not added.
pub fn replace_status_condition(subscription: &mut Subscription, condition: Condition) -> bool {
    let status = subscription.status_mut();
    let desired: Vec<Condition> = status
        .conditions
        .iter()
        .map(|c| {
            if c.r#type == condition.r#type {
                condition.clone()
            } else {
                c.clone()
            }
        })
        .collect();
    let ready = desired.iter().all(|c| c.status == ConditionStatus::True);

    if crate::crd::conditions_equal(&status.conditions, &desired) && status.ready == ready {
        return false;
    }
    status.conditions = desired;
    status.ready = ready;
    true
}

/// Brings the status to the required set of conditions
///
/// A changed set keeps the surviving conditions, adds the missing ones as
/// `Unknown` and flips `ready` so the status is written. The APIRule
/// bookkeeping starts over.
pub fn sync_initial_status(subscription: &mut Subscription) {
    let status = subscription.status_mut();
    let expected = make_subscription_conditions();

    if contain_same_condition_types(&status.conditions, &expected)
        && !status.should_update_ready_status()
    {
        return;
    }

    if status.conditions.is_empty() {
        *status = SubscriptionStatus::initial();
    } else {
        status.conditions = required_conditions(&status.conditions, expected);
        status.ready = !status.ready;
    }
    status.backend.api_rule_name = None;
    status.backend.external_sink = None;
}

fn required_conditions(current: &[Condition], expected: Vec<Condition>) -> Vec<Condition> {
    let mut required: Vec<Condition> = current
        .iter()
        .filter(|c| expected.iter().any(|e| e.r#type == c.r#type))
        .cloned()
        .collect();
    for condition in expected {
        if !required.iter().any(|c| c.r#type == condition.r#type) {
            required.push(condition);
        }
    }
    required
}

/// `Subscribed`: True with the EventMesh name, False with the sync error
pub fn sync_condition_subscribed(subscription: &mut Subscription, mapped_name: &str, error: Option<&str>) {
    let condition = match error {
        None => Condition::new(
            ConditionType::Subscribed,
            ConditionStatus::True,
            Some(ConditionReason::SubscriptionCreated),
            format!("EventMesh-subscription-name={mapped_name}"),
        ),
        Some(message) => Condition::new(
            ConditionType::Subscribed,
            ConditionStatus::False,
            Some(ConditionReason::SubscriptionCreationFailed),
            message,
        ),
    };
    replace_status_condition(subscription, condition);
}

pub fn sync_condition_subscription_active(subscription: &mut Subscription, is_active: bool) {
    let condition = if is_active {
        Condition::new(
            ConditionType::SubscriptionActive,
            ConditionStatus::True,
            Some(ConditionReason::SubscriptionActive),
            "",
        )
    } else {
        Condition::new(
            ConditionType::SubscriptionActive,
            ConditionStatus::False,
            Some(ConditionReason::SubscriptionNotActive),
            "Waiting for subscription to be active",
        )
    };
    replace_status_condition(subscription, condition);
}

/// `Webhook call status`: False while the last delivery failed
pub fn sync_condition_webhook_call_status(subscription: &mut Subscription) {
    let mirrored = subscription
        .status
        .as_ref()
        .and_then(|s| s.backend.ems_subscription_status.clone())
        .unwrap_or_default();

    let (status, message) = match check_last_failed_delivery(&mirrored) {
        Err(e) => (ConditionStatus::False, e.to_string()),
        Ok(true) => (ConditionStatus::False, mirrored.last_failed_delivery_reason),
        Ok(false) => (ConditionStatus::True, String::new()),
    };
    replace_status_condition(
        subscription,
        Condition::new(
            ConditionType::WebhookCallStatus,
            status,
            Some(ConditionReason::WebhookCallStatus),
            message,
        ),
    );
}

/// Whether the EventMesh subscription is active
///
/// The first inactive observation records the time in
/// `backend.failedActivation`; staying inactive past `timeout` is an error.
///
/// # Errors
///
/// Returns an error once the subscription stayed inactive for longer than
/// `timeout`.
pub fn check_status_active(
    subscription: &mut Subscription,
    timeout: Duration,
    now: DateTime<Utc>,
) -> Result<bool, StatusCheckError> {
    let name = subscription.name_any();
    let backend = &mut subscription.status_mut().backend;
    let Some(mirrored) = &backend.ems_subscription_status else {
        return Ok(false);
    };

    if mirrored.status == SubscriptionState::Active.as_str() {
        backend.failed_activation = None;
        return Ok(true);
    }

    let first_seen = match backend.failed_activation.clone() {
        Some(first_seen) if !first_seen.is_empty() => first_seen,
        _ => {
            backend.failed_activation = Some(now.to_rfc3339());
            return Ok(false);
        }
    };
    let first_seen = DateTime::parse_from_rfc3339(&first_seen)
        .map_err(|e| StatusCheckError::FailedActivation(e.to_string()))?;
    let elapsed = now.signed_duration_since(first_seen.with_timezone(&Utc));
    if elapsed.to_std().is_ok_and(|elapsed| elapsed > timeout) {
        return Err(StatusCheckError::ActivationTimeout(name));
    }
    Ok(false)
}

/// True when the last delivery attempt failed
///
/// # Errors
///
/// Returns an error when one of the delivery timestamps is not RFC3339.
pub fn check_last_failed_delivery(status: &EventMeshSubscriptionStatus) -> Result<bool, StatusCheckError> {
    if status.last_failed_delivery.is_empty() {
        return Ok(false);
    }
    let last_failed = DateTime::parse_from_rfc3339(&status.last_failed_delivery)
        .map_err(|e| StatusCheckError::LastFailedDelivery(e.to_string()))?;

    if status.last_successful_delivery.is_empty() {
        return Ok(true);
    }
    let last_successful = DateTime::parse_from_rfc3339(&status.last_successful_delivery)
        .map_err(|e| StatusCheckError::LastSuccessfulDelivery(e.to_string()))?;

    Ok(last_failed > last_successful)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SubscriptionSpec;

    fn subscription() -> Subscription {
        let mut sub = Subscription::new("sub", SubscriptionSpec::default());
        sub.status = Some(SubscriptionStatus::initial());
        sub
    }

    fn condition(sub: &Subscription, t: ConditionType) -> Condition {
        sub.status
            .as_ref()
            .and_then(|s| s.find_condition(t))
            .cloned()
            .unwrap()
    }

    fn mirror(sub: &mut Subscription, status: &str) {
        sub.status_mut().backend.ems_subscription_status = Some(EventMeshSubscriptionStatus {
            status: status.to_string(),
            ..Default::default()
        });
    }

    #[test]
    fn test_replace_status_condition_tracks_readiness() {
        let mut sub = subscription();
        for t in ConditionType::ALL {
            let changed = replace_status_condition(
                &mut sub,
                Condition::new(t, ConditionStatus::True, None, ""),
            );
            assert!(changed);
        }
        assert!(sub.status.as_ref().unwrap().ready);

        assert!(!replace_status_condition(
            &mut sub,
            Condition::new(ConditionType::Subscribed, ConditionStatus::True, None, "")
        ));

        assert!(replace_status_condition(
            &mut sub,
            Condition::new(ConditionType::ApiRuleStatus, ConditionStatus::False, None, "x")
        ));
        assert!(!sub.status.as_ref().unwrap().ready);
    }

    #[test]
    fn test_sync_initial_status_on_empty_status() {
        let mut sub = Subscription::new("sub", SubscriptionSpec::default());
        sync_initial_status(&mut sub);
        let status = sub.status.unwrap();
        assert_eq!(status.conditions.len(), 4);
        assert!(!status.ready);
    }

    #[test]
    fn test_sync_initial_status_keeps_converged_status() {
        let mut sub = subscription();
        sub.status_mut().backend.api_rule_name = Some("webhook-abc".to_string());
        let before = sub.status.clone();
        sync_initial_status(&mut sub);
        assert_eq!(sub.status, before);
    }

    #[test]
    fn test_sync_initial_status_rebuilds_changed_condition_set() {
        let mut sub = subscription();
        let status = sub.status_mut();
        status.conditions[0].status = ConditionStatus::True;
        status.conditions.pop();
        status.conditions.push(Condition {
            r#type: "Subscription name".to_string(),
            status: ConditionStatus::True,
            last_transition_time: None,
            reason: None,
            message: None,
        });
        status.backend.api_rule_name = Some("webhook-abc".to_string());
        status.backend.external_sink = Some("https://web-abc.example.com/".to_string());

        sync_initial_status(&mut sub);
        let status = sub.status.unwrap();
        assert!(contain_same_condition_types(
            &status.conditions,
            &make_subscription_conditions()
        ));
        assert_eq!(status.conditions[0].status, ConditionStatus::True);
        assert!(status.ready, "ready is flipped to force a write");
        assert_eq!(status.backend.api_rule_name, None);
        assert_eq!(status.backend.external_sink, None);
    }

    #[test]
    fn test_subscribed_condition() {
        let mut sub = subscription();
        sync_condition_subscribed(&mut sub, "mapped", None);
        let c = condition(&sub, ConditionType::Subscribed);
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(c.message.as_deref(), Some("EventMesh-subscription-name=mapped"));

        sync_condition_subscribed(&mut sub, "mapped", Some("boom"));
        let c = condition(&sub, ConditionType::Subscribed);
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(
            c.reason.as_deref(),
            Some(ConditionReason::SubscriptionCreationFailed.as_str())
        );
        assert_eq!(c.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_check_status_active_times_out() {
        let mut sub = subscription();
        let timeout = Duration::from_secs(30);
        let t0 = Utc::now();

        assert_eq!(check_status_active(&mut sub, timeout, t0), Ok(false));

        mirror(&mut sub, "Paused");
        assert_eq!(check_status_active(&mut sub, timeout, t0), Ok(false));
        let recorded = sub.status.as_ref().unwrap().backend.failed_activation.clone();
        assert!(recorded.is_some());

        let later = t0 + chrono::Duration::seconds(10);
        assert_eq!(check_status_active(&mut sub, timeout, later), Ok(false));
        assert_eq!(sub.status.as_ref().unwrap().backend.failed_activation, recorded);

        let too_late = t0 + chrono::Duration::seconds(31);
        assert_eq!(
            check_status_active(&mut sub, timeout, too_late),
            Err(StatusCheckError::ActivationTimeout("sub".to_string()))
        );

        mirror(&mut sub, "Active");
        assert_eq!(check_status_active(&mut sub, timeout, too_late), Ok(true));
        assert_eq!(sub.status.unwrap().backend.failed_activation, None);
    }

    #[test]
    fn test_check_last_failed_delivery() {
        let mut status = EventMeshSubscriptionStatus::default();
        assert_eq!(check_last_failed_delivery(&status), Ok(false));

        status.last_failed_delivery = "2024-01-01T10:00:00Z".to_string();
        assert_eq!(check_last_failed_delivery(&status), Ok(true));

        status.last_successful_delivery = "2024-01-01T11:00:00Z".to_string();
        assert_eq!(check_last_failed_delivery(&status), Ok(false));

        status.last_successful_delivery = "2024-01-01T09:00:00Z".to_string();
        assert_eq!(check_last_failed_delivery(&status), Ok(true));

        status.last_failed_delivery = "yesterday".to_string();
        assert!(matches!(
            check_last_failed_delivery(&status),
            Err(StatusCheckError::LastFailedDelivery(_))
        ));
    }

    #[test]
    fn test_webhook_call_status_condition() {
        let mut sub = subscription();
        sub.status_mut().backend.ems_subscription_status = Some(EventMeshSubscriptionStatus {
            status: "Active".to_string(),
            last_failed_delivery: "2024-01-01T10:00:00Z".to_string(),
            last_failed_delivery_reason: "503 Service Unavailable".to_string(),
            ..Default::default()
        });
        sync_condition_webhook_call_status(&mut sub);
        let c = condition(&sub, ConditionType::WebhookCallStatus);
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.message.as_deref(), Some("503 Service Unavailable"));

        sub.status_mut()
            .backend
            .ems_subscription_status
            .as_mut()
            .unwrap()
            .last_successful_delivery = "2024-01-01T12:00:00Z".to_string();
        sync_condition_webhook_call_status(&mut sub);
        let c = condition(&sub, ConditionType::WebhookCallStatus);
        assert_eq!(c.status, ConditionStatus::True);
        assert_eq!(
            c.reason.as_deref(),
            Some(ConditionReason::WebhookCallStatus.as_str())
        );
    }
}
