//! Writing a reconciled Subscription back to the API server.

use crate::controller::reconciler::types::Reconciler;
use crate::crd::{ConditionStatus, Subscription};
use crate::events::actions;
use crate::observability::record_ready_transition;
use crate::store::StoreError;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::debug;

/// Copies status and finalizers of `subscription` onto the latest stored
/// object and writes what changed
///
/// A Subscription that vanished in the meantime is left alone.
pub(crate) async fn update_subscription(
    ctx: &Reconciler,
    subscription: &Subscription,
) -> Result<(), StoreError> {
    let namespace = subscription.namespace().unwrap_or_default();
    let name = subscription.name_any();
    let Some(latest) = ctx.store.get_subscription(&namespace, &name).await? else {
        debug!(namespace = %namespace, name = %name, "Subscription gone, nothing to persist");
        return Ok(());
    };

    let mut desired = latest.clone();
    desired.status.clone_from(&subscription.status);
    desired.metadata.finalizers.clone_from(&subscription.metadata.finalizers);

    emit_condition_events(ctx, &latest, &desired).await;

    let old_status = latest.status.clone().unwrap_or_default();
    let new_status = desired.status.clone().unwrap_or_default();
    if !old_status.equals_ignoring_time(&new_status) {
        let updated = ctx.store.update_subscription_status(&desired).await?;
        desired.metadata.resource_version = updated.metadata.resource_version;
        record_ready_transition(old_status.ready, new_status.ready);
        debug!(namespace = %namespace, name = %name, ready = new_status.ready, "Updated subscription status");
    }

    if latest.finalizers() != desired.finalizers() {
        ctx.store.update_subscription(&desired).await?;
        debug!(
            namespace = %namespace,
            name = %name,
            old = ?latest.finalizers(),
            new = ?desired.finalizers(),
            "Updated subscription finalizers"
        );
    }
    Ok(())
}

/// One event per condition that differs from the stored one, Warning when
/// the condition is False. Conditions without a reason use their type.
async fn emit_condition_events(ctx: &Reconciler, old: &Subscription, new: &Subscription) {
    let Some(new_status) = &new.status else {
        return;
    };
    let object_ref = new.object_ref(&());
    for condition in &new_status.conditions {
        let unchanged = old
            .status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.r#type == condition.r#type))
            .is_some_and(|c| c.equals_ignoring_time(condition));
        if unchanged {
            continue;
        }
        let type_ = if condition.status == ConditionStatus::False {
            EventType::Warning
        } else {
            EventType::Normal
        };
        ctx.events
            .publish(
                &object_ref,
                type_,
                condition.reason.as_deref().unwrap_or(&condition.r#type),
                actions::RECONCILE,
                condition.message.clone(),
            )
            .await;
    }
}
