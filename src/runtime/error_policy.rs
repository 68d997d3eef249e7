//! # Error Policy
//!
//! Handles reconciliation errors and controller stream errors.

use crate::controller::reconciler::{Reconciler, ReconcilerError};
use crate::crd::Subscription;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed Subscription with its own Fibonacci backoff
///
/// Backoff state is kept per `namespace/name` so one failing Subscription
/// never delays another.
pub fn handle_reconciliation_error(
    obj: Arc<Subscription>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = obj.key();
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.key = %key,
        phase = %error.phase(),
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", key, error);
    observability::increment_reconciliation_errors();

    let delay = ctx.next_backoff(&key);
    info!(
        "Retrying {} with Fibonacci backoff in {}s",
        key,
        delay.as_secs()
    );
    Action::requeue(delay)
}

/// What to do after a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorAction {
    /// Keep consuming the stream
    Continue,
    /// Wait, then let the stream restart
    Restart(Duration),
}

/// Classify a controller stream error
///
/// Expired resource versions restart immediately, throttling and unknown
/// errors wait `restart_delay` first, a missing object is ignored.
#[must_use]
pub fn classify_stream_error(error: &str, restart_delay: Duration) -> StreamErrorAction {
    let is_not_found = error.contains("ObjectNotFound") || error.contains("404");
    let is_410 = error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired");
    let is_429 = error.contains("429") || error.contains("TooManyRequests");

    if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
        StreamErrorAction::Restart(Duration::ZERO)
    } else if is_429 {
        warn!(
            "API server is throttling (429), backing off {}s before restart",
            restart_delay.as_secs()
        );
        StreamErrorAction::Restart(restart_delay)
    } else if is_not_found {
        warn!("Object not found (404) while watching, it was probably deleted: {}", error);
        StreamErrorAction::Continue
    } else {
        error!("Controller stream error: {}", error);
        StreamErrorAction::Restart(restart_delay)
    }
}
