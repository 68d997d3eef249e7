//! # Reconciliation Flow
//!
//! 1. Fetch the Subscription, nothing to do when it is gone
//! 2. Deleting: remove it from EventMesh and its APIRule, drop the finalizer
//! 3. Initialize conditions and set the finalizer
//! 4. Validate the sink and sync the APIRule
//! 5. Sync the EventMesh subscription and derive the conditions
//! 6. Persist status and finalizers

use crate::controller::apirule::ApiRuleSyncError;
use crate::controller::reconciler::persist::update_subscription;
use crate::controller::reconciler::status::{
    check_status_active, replace_status_condition, sync_condition_subscribed,
    sync_condition_subscription_active, sync_condition_webhook_call_status, sync_initial_status,
};
use crate::controller::reconciler::types::{ReconcilePhase, Reconciler, ReconcilerError};
use crate::crd::{
    ApiRule, Condition, ConditionReason, ConditionStatus, ConditionType, Subscription,
    SubscriptionStatus,
};
use crate::events::{actions, reasons};
use crate::observability;
use crate::sink::SinkValidationError;
use chrono::Utc;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Outcome of the APIRule step that does not end the reconciliation
#[derive(Debug, thiserror::Error)]
enum ApiRuleStepError {
    #[error(transparent)]
    Sink(#[from] SinkValidationError),
    #[error(transparent)]
    ApiRule(#[from] ApiRuleSyncError),
}

impl ApiRuleStepError {
    fn is_skippable(&self) -> bool {
        match self {
            ApiRuleStepError::Sink(e) => e.is_skippable(),
            ApiRuleStepError::ApiRule(e) => e.is_skippable(),
        }
    }

    fn into_reconciler_error(self) -> ReconcilerError {
        let phase = ReconcilePhase::SyncingApiRule;
        match self {
            ApiRuleStepError::Sink(source) => ReconcilerError::Sink { phase, source },
            ApiRuleStepError::ApiRule(source) => ReconcilerError::ApiRule { phase, source },
        }
    }
}

/// Reconcile one Subscription
///
/// # Errors
///
/// Hard failures are returned for the error policy to back off; skippable
/// ones are recorded on the conditions only.
pub async fn reconcile(
    subscription: Arc<Subscription>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let namespace = subscription.namespace().unwrap_or_default();
    let name = subscription.name_any();
    let span = info_span!("reconcile", namespace = %namespace, name = %name);

    async move {
        observability::increment_reconciliations();
        debug!("Received new reconcile request");
        let result = reconcile_subscription(&ctx, &namespace, &name).await;
        observability::observe_reconcile_duration(start.elapsed().as_secs_f64());
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_subscription(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let Some(mut sub) = ctx
        .store
        .get_subscription(namespace, name)
        .await
        .map_err(ReconcilerError::store(ReconcilePhase::Fetching))?
    else {
        debug!("Subscription not found, skipping");
        ctx.backoff.reset(&format!("{namespace}/{name}"));
        return Ok(Action::await_change());
    };
    let key = sub.key();

    if sub.is_being_deleted() {
        let action = handle_deletion(ctx, sub).await?;
        ctx.backoff.reset(&key);
        return Ok(action);
    }

    sync_initial_status(&mut sub);
    if sub.add_finalizer() {
        debug!(phase = %ReconcilePhase::Initializing, "Added finalizer");
    }

    let api_rule = match sync_api_rule(ctx, &mut sub).await {
        Ok(api_rule) => {
            replace_status_condition(&mut sub, SubscriptionStatus::api_rule_condition(None));
            Some(api_rule)
        }
        Err(e) if e.is_skippable() => {
            let message = e.to_string();
            debug!(reason = %message, "APIRule not usable yet");
            replace_status_condition(
                &mut sub,
                SubscriptionStatus::api_rule_condition(Some(&message)),
            );
            match e {
                ApiRuleStepError::ApiRule(e) => e.api_rule().cloned(),
                ApiRuleStepError::Sink(_) => None,
            }
        }
        Err(e) => {
            let message = e.to_string();
            replace_status_condition(
                &mut sub,
                SubscriptionStatus::api_rule_condition(Some(&message)),
            );
            return Err(persist_then_fail(ctx, &sub, e.into_reconciler_error()).await);
        }
    };

    let Some(api_rule) = api_rule else {
        update_subscription(ctx, &sub)
            .await
            .map_err(ReconcilerError::store(ReconcilePhase::Persisting))?;
        let delay = ctx.backoff.next(&key);
        debug!(requeue_after = ?delay, "No APIRule to sync EventMesh with, requeuing");
        return Ok(Action::requeue(delay));
    };

    let is_active = match sync_event_mesh(ctx, &mut sub, &api_rule).await {
        Ok(is_active) => is_active,
        Err(e) => return Err(persist_then_fail(ctx, &sub, e).await),
    };

    update_subscription(ctx, &sub)
        .await
        .map_err(ReconcilerError::store(ReconcilePhase::Persisting))?;
    ctx.backoff.reset(&key);

    if is_active {
        Ok(Action::await_change())
    } else {
        debug!("Requeuing reconciliation because EventMesh subscription is not ready");
        Ok(Action::requeue(ctx.config.requeue_after_duration()))
    }
}

async fn handle_deletion(ctx: &Reconciler, mut sub: Subscription) -> Result<Action, ReconcilerError> {
    let phase = ReconcilePhase::Deleting;
    if !sub.has_finalizer() {
        return Ok(Action::await_change());
    }

    debug!(phase = %phase, "Deleting subscription on EventMesh");
    ctx.event_mesh
        .delete_subscription(&sub)
        .await
        .map_err(|source| ReconcilerError::EventMesh { phase, source })?;
    ctx.api_rules
        .release(&sub)
        .await
        .map_err(|source| ReconcilerError::ApiRule { phase, source })?;

    replace_status_condition(
        &mut sub,
        Condition::new(
            ConditionType::Subscribed,
            ConditionStatus::False,
            Some(ConditionReason::SubscriptionDeleted),
            "",
        ),
    );
    sub.remove_finalizer();

    update_subscription(ctx, &sub)
        .await
        .map_err(ReconcilerError::store(ReconcilePhase::Persisting))?;
    info!("Subscription deleted");
    Ok(Action::await_change())
}

/// Validates the sink and creates or updates its APIRule
async fn sync_api_rule(ctx: &Reconciler, sub: &mut Subscription) -> Result<ApiRule, ApiRuleStepError> {
    let target = match ctx.sink_validator.validate(sub).await {
        Ok(target) => target,
        Err(e) => {
            if e.is_skippable() {
                ctx.events
                    .publish(
                        &sub.object_ref(&()),
                        EventType::Warning,
                        reasons::VALIDATION_FAILED,
                        actions::RECONCILE,
                        Some(e.to_string()),
                    )
                    .await;
            }
            return Err(e.into());
        }
    };
    Ok(ctx.api_rules.sync(sub, &target).await?)
}

/// Syncs EventMesh and derives the conditions, returns whether the
/// EventMesh subscription is active
async fn sync_event_mesh(
    ctx: &Reconciler,
    sub: &mut Subscription,
    api_rule: &ApiRule,
) -> Result<bool, ReconcilerError> {
    let phase = ReconcilePhase::SyncingBackend;
    let mapped_name = ctx
        .name_mapper
        .map_subscription_name(&sub.name_any(), &sub.namespace().unwrap_or_default());

    debug!(phase = %phase, eventmesh.name = %mapped_name, "Syncing subscription with EventMesh");
    if let Err(source) = ctx
        .event_mesh
        .sync_subscription(sub, ctx.cleaner.as_ref(), api_rule)
        .await
    {
        sync_condition_subscribed(sub, &mapped_name, Some(&source.to_string()));
        return Err(ReconcilerError::EventMesh { phase, source });
    }

    let is_active = check_status_active(sub, ctx.config.activation_timeout_duration(), Utc::now())
        .map_err(|source| ReconcilerError::Activation { phase, source })?;

    sync_condition_subscribed(sub, &mapped_name, None);
    sync_condition_subscription_active(sub, is_active);
    sync_condition_webhook_call_status(sub);
    Ok(is_active)
}

/// Persists what was recorded before returning `err`
async fn persist_then_fail(
    ctx: &Reconciler,
    sub: &Subscription,
    err: ReconcilerError,
) -> ReconcilerError {
    if let Err(persist_err) = update_subscription(ctx, sub).await {
        warn!(error = %persist_err, "Failed to persist subscription status");
    }
    err
}
