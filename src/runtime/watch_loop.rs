//! # Watch Loop
//!
//! Runs the Subscription controller. Subscriptions are watched directly,
//! APIRules map back to every Subscription listed in their owner references.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{ApiRule, Subscription};
use crate::runtime::error_policy::{
    classify_stream_error, handle_reconciliation_error, StreamErrorAction,
};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller, watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller until a shutdown signal arrives
///
/// The controller stream is restarted after `watch_restart_delay_secs`
/// whenever it ends without a shutdown request.
///
/// # Errors
///
/// Does not fail at the moment.
pub async fn run_watch_loop(
    subscriptions: Api<Subscription>,
    api_rules: Api<ApiRule>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config().clone();
    let restart_delay = config.watch_restart_delay_duration();

    let shutdown_state = server_state.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown_state.set_ready(false);
    });

    loop {
        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        info!(
            concurrency = config.max_concurrent_reconciles,
            "Starting Subscription controller"
        );
        Controller::new(subscriptions.clone(), watcher::Config::default())
            .owns(api_rules.clone(), watcher::Config::default())
            .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciles))
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, reconciler.clone())
            .for_each(|result| async move {
                match result {
                    Ok((object, _action)) => debug!(object = %object, "Reconciled"),
                    Err(e) => {
                        if let StreamErrorAction::Restart(delay) =
                            classify_stream_error(&format!("{e:?}"), restart_delay)
                        {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            })
            .await;

        if !server_state.ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        warn!(
            "Controller stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
