//! # Initialization
//!
//! Controller startup: rustls provider, tracing, metrics, probe server,
//! Kubernetes client and the reconciler with its collaborators.

use crate::config::env::env_var_or_default_str;
use crate::config::{ControllerConfig, EventMeshConfig};
use crate::constants::{
    CONTROLLER_NAME, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use crate::controller::apirule::KubeApiRuleManager;
use crate::controller::reconciler::{Components, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{ApiRule, Subscription};
use crate::eventmesh::{
    EventMesh, EventMeshCleaner, EventMeshNameMapper, EventMeshSettings, RestEventMeshClient,
};
use crate::events::KubeEventPublisher;
use crate::observability;
use crate::sink::ClusterLocalSinkValidator;
use crate::store::{KubeStore, ObjectStore};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// Subscriptions in all namespaces
    pub subscriptions: Api<Subscription>,
    /// APIRules in all namespaces
    pub api_rules: Api<ApiRule>,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Returns an error when configuration is invalid, the probe server does
/// not come up or no Kubernetes client can be created.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything opens a TLS connection
    let rustls_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    init_tracing(&env_var_or_default_str("LOG_FORMAT", "text"))?;
    if !rustls_installed {
        warn!("A rustls crypto provider was already installed, keeping it");
    }

    info!("Starting eventing controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config = ControllerConfig::from_env().context("Invalid controller configuration")?;
    let eventmesh_config =
        EventMeshConfig::from_env().context("Invalid EventMesh configuration")?;
    info!(
        domain = %config.domain,
        webhook_auth_enabled = config.feature_flags.webhook_auth_enabled(),
        "Configuration loaded"
    );

    observability::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let subscriptions: Api<Subscription> = Api::all(client.clone());
    let api_rules: Api<ApiRule> = Api::all(client.clone());

    let reconciler = Arc::new(build_reconciler(&client, config, &eventmesh_config)?);
    log_existing_subscriptions(&subscriptions).await;

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        subscriptions,
        api_rules,
        reconciler,
        server_state,
    })
}

/// `LOG_FORMAT=json` switches to JSON lines, `RUST_LOG` overrides the filter
fn init_tracing(log_format: &str) -> Result<()> {
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "eventing_controller=info".into())
    };
    let result = if log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter()).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))
}

/// Wire the reconciler to the cluster and EventMesh
fn build_reconciler(
    client: &Client,
    config: ControllerConfig,
    eventmesh_config: &EventMeshConfig,
) -> Result<Reconciler> {
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone()));
    let events = Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));
    let name_mapper = Arc::new(EventMeshNameMapper::new(
        config.domain.clone(),
        config.max_subscription_name_length,
    ));

    let eventmesh_client = RestEventMeshClient::new(
        eventmesh_config.api_url.clone(),
        eventmesh_config.credentials.clone(),
    )
    .context("Failed to create EventMesh client")?;
    let event_mesh = EventMesh::new(
        Arc::new(eventmesh_client),
        name_mapper.clone(),
        EventMeshSettings::from_config(eventmesh_config),
        config.feature_flags.clone(),
    );
    let api_rules = KubeApiRuleManager::from_config(store.clone(), events.clone(), &config);

    let components = Components {
        sink_validator: Arc::new(ClusterLocalSinkValidator::new(store.clone())),
        store,
        event_mesh: Arc::new(event_mesh),
        api_rules: Arc::new(api_rules),
        cleaner: Arc::new(EventMeshCleaner),
        name_mapper,
        events,
    };
    Ok(Reconciler::new(components, config))
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log a per-namespace summary of existing Subscriptions
///
/// A failing list usually means the CRD is missing; the controller starts
/// anyway and its watch keeps retrying.
async fn log_existing_subscriptions(subscriptions: &Api<Subscription>) {
    match subscriptions.list(&ListParams::default()).await {
        Ok(list) => {
            let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
            for item in &list.items {
                by_namespace
                    .entry(item.namespace().unwrap_or_default())
                    .or_default()
                    .push(item.name_any());
            }
            info!(
                "Found {} existing Subscriptions in {} namespaces",
                list.items.len(),
                by_namespace.len()
            );
            for (namespace, mut names) in by_namespace {
                names.sort();
                info!("Namespace {}: {}", namespace, names.join(", "));
            }
        }
        Err(e) => {
            error!("Subscription CRD is not queryable: {}. Is the CRD installed?", e);
            warn!("Continuing, the controller watch will retry");
        }
    }
}
