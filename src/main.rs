//! # Eventing Controller
//!
//! Keeps eventing `Subscription` resources in sync with EventMesh:
//!
//! 1. **Sink validation** - only cluster-local services of the Subscription's namespace
//! 2. **APIRule** - exposes the sink through a shared, owner-referenced APIRule
//! 3. **EventMesh** - creates, recreates or rotates the EventMesh subscription
//! 4. **Status** - mirrors the EventMesh state into Kubernetes conditions
//!
//! Metrics are served on `/metrics`, probes on `/healthz` and `/readyz`.

use anyhow::Result;
use eventing_controller::runtime::{initialize, run_watch_loop};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(
        init.subscriptions,
        init.api_rules,
        init.reconciler,
        init.server_state,
    )
    .await?;
    info!("Eventing controller stopped");
    Ok(())
}
