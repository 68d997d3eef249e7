//! # Sync Engine
//!
//! Decides per Subscription whether the EventMesh subscription has to be
//! created, recreated, left alone or only get new webhook credentials.
//!
//! Drift is detected with three hashes kept in the Subscription status:
//!
//! - the desired subscription, with credentials (`ev2hash`) or without
//!   (`eventMeshLocalHash`) depending on whether webhook auth rotation is
//!   enabled
//! - the cleaned server copy (`eventMeshHash`), catching changes made on
//!   EventMesh directly
//! - the webhook auth block (`webhookAuthHash`), driving rotation
//!
//! Any local or server drift recreates the EventMesh subscription. A pure
//! credential change pauses it, patches the credentials and resumes it.

use crate::config::{EventMeshConfig, FeatureFlags};
use crate::crd::{
    ApiRule, Backend, EventMeshSubscriptionStatus, EventMeshTypes, EventType, Subscription,
};
use crate::eventmesh::client::EventMeshClient;
use crate::eventmesh::convert::{self, clean_subscription, ConversionDefaults};
use crate::eventmesh::event_types::{EventTypeCleaner, EventTypeInfo, EventTypeProcessor};
use crate::eventmesh::hash::{hash_subscription, hash_webhook_auth};
use crate::eventmesh::name_mapper::NameMapper;
use crate::eventmesh::types::{self, ProtocolSettings, Response, State, WebhookAuth};
use crate::eventmesh::{EventMeshError, EventMeshSyncer};
use crate::sink::SinkTarget;
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings shared by every Subscription
#[derive(Debug, Clone)]
pub struct EventMeshSettings {
    /// EventMesh namespace, the source of standard matching events
    pub namespace: String,
    pub event_type_prefix: String,
    pub protocol: ProtocolSettings,
    /// Credentials EventMesh uses to call webhooks unless overridden
    pub webhook_auth: WebhookAuth,
}

impl EventMeshSettings {
    #[must_use]
    pub fn from_config(config: &EventMeshConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            event_type_prefix: config.event_type_prefix.clone(),
            protocol: config.protocol.clone(),
            webhook_auth: config.webhook_credentials.webhook_auth(),
        }
    }
}

/// The EventMesh sync engine
pub struct EventMesh {
    client: Arc<dyn EventMeshClient>,
    name_mapper: Arc<dyn NameMapper>,
    processor: EventTypeProcessor,
    settings: EventMeshSettings,
    feature_flags: FeatureFlags,
}

impl EventMesh {
    #[must_use]
    pub fn new(
        client: Arc<dyn EventMeshClient>,
        name_mapper: Arc<dyn NameMapper>,
        settings: EventMeshSettings,
        feature_flags: FeatureFlags,
    ) -> Self {
        Self {
            client,
            name_mapper,
            processor: EventTypeProcessor::new(settings.event_type_prefix.clone()),
            settings,
            feature_flags,
        }
    }

    fn mapped_name(&self, subscription: &Subscription) -> String {
        self.name_mapper.map_subscription_name(
            &subscription.name_any(),
            &subscription.namespace().unwrap_or_default(),
        )
    }

    /// The subscription on the server, `None` when it does not exist
    async fn fetch(&self, name: &str) -> Result<Option<types::Subscription>, EventMeshError> {
        let (subscription, response) = self.client.get(name).await?;
        match response.status_code {
            200 => Ok(subscription),
            404 => Ok(None),
            _ => Err(status_error("get", name, response)),
        }
    }

    async fn create(&self, subscription: &types::Subscription) -> Result<(), EventMeshError> {
        let response = self.client.create(subscription).await?;
        if response.status_code > 202 && response.status_code != 409 {
            return Err(status_error("create", &subscription.name, response));
        }
        info!(eventmesh.name = %subscription.name, "Created EventMesh subscription");
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), EventMeshError> {
        let response = self.client.delete(name).await?;
        match response.status_code {
            204 | 404 => {
                debug!(eventmesh.name = %name, status = response.status_code, "Deleted EventMesh subscription");
                Ok(())
            }
            _ => Err(status_error("delete", name, response)),
        }
    }

    /// Pause, patch the webhook auth and resume
    ///
    /// A subscription vanishing in between is left to the next sync.
    async fn rotate_webhook_auth(&self, name: &str, auth: &WebhookAuth) -> Result<(), EventMeshError> {
        info!(eventmesh.name = %name, "Rotating webhook credentials of EventMesh subscription");

        let response = self.client.update_state(name, State::pause()).await?;
        if !expect_status("pause", name, response, 202)? {
            return Ok(());
        }
        let response = self.client.update_webhook_auth(name, auth).await?;
        if !expect_status("update webhook auth of", name, response, 204)? {
            return Ok(());
        }
        let response = self.client.update_state(name, State::resume()).await?;
        expect_status("resume", name, response, 202)?;
        Ok(())
    }
}

fn status_error(operation: &'static str, name: &str, response: Response) -> EventMeshError {
    EventMeshError::HttpStatus {
        operation,
        name: name.to_string(),
        status_code: response.status_code,
        message: response.message,
    }
}

/// Ok(true) on the expected code, Ok(false) when the subscription is gone
fn expect_status(
    operation: &'static str,
    name: &str,
    response: Response,
    expected: u16,
) -> Result<bool, EventMeshError> {
    match response.status_code {
        code if code == expected => Ok(true),
        404 => {
            warn!(eventmesh.name = %name, operation, "EventMesh subscription not found during webhook auth rotation");
            Ok(false)
        }
        _ => Err(status_error(operation, name, response)),
    }
}

/// Copy the server reported status into the backend status
fn mirror_status(backend: &mut Backend, server: &types::Subscription) -> bool {
    let mirrored = EventMeshSubscriptionStatus {
        status: server
            .subscription_status
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        status_reason: server.subscription_status_reason.clone(),
        last_successful_delivery: server.last_successful_delivery.clone(),
        last_failed_delivery: server.last_failed_delivery.clone(),
        last_failed_delivery_reason: server.last_failed_delivery_reason.clone(),
    };
    if backend.ems_subscription_status.as_ref() == Some(&mirrored) {
        return false;
    }
    backend.ems_subscription_status = Some(mirrored);
    true
}

fn record_types(subscription: &mut Subscription, type_infos: &[EventTypeInfo]) {
    let status = subscription.status_mut();
    status.types = type_infos
        .iter()
        .map(|info| EventType {
            original_type: info.original_type.clone(),
            clean_type: info.clean_type.clone(),
        })
        .collect();
    status.backend.ems_types = type_infos
        .iter()
        .map(|info| EventMeshTypes {
            original_type: info.original_type.clone(),
            event_mesh_type: info.processed_type.clone(),
        })
        .collect();
}

#[async_trait]
impl EventMeshSyncer for EventMesh {
    async fn sync_subscription(
        &self,
        subscription: &mut Subscription,
        cleaner: &dyn EventTypeCleaner,
        api_rule: &ApiRule,
    ) -> Result<bool, EventMeshError> {
        let name = self.mapped_name(subscription);
        let type_infos = self.processor.process(subscription, cleaner)?;

        let sink_path = SinkTarget::parse(&subscription.spec.sink)
            .map(|t| t.path)
            .map_err(|_| EventMeshError::ExposedUrl(api_rule.name_any()))?;
        let webhook_url = api_rule
            .exposed_url(&sink_path)
            .ok_or_else(|| EventMeshError::ExposedUrl(api_rule.name_any()))?;

        let desired = convert::to_event_mesh_subscription(
            name.clone(),
            subscription,
            &type_infos,
            webhook_url,
            ConversionDefaults {
                protocol: &self.settings.protocol,
                webhook_auth: &self.settings.webhook_auth,
                namespace: &self.settings.namespace,
            },
        )?;
        let desired_hash = hash_subscription(&desired)?;
        let local_hash = hash_subscription(&clean_subscription(&desired))?;
        let auth_hash = hash_webhook_auth(desired.webhook_auth.as_ref())?;
        let rotation_enabled = self.feature_flags.webhook_auth_enabled();

        let stored = subscription.status_mut().backend.clone();
        let mut modified = if rotation_enabled {
            local_hash != stored.event_mesh_local_hash
        } else {
            desired_hash != stored.ev2hash
        };
        if modified {
            debug!(eventmesh.name = %name, "Subscription changed locally, recreating it on EventMesh");
            self.delete(&name).await?;
        }

        let mut server = None;
        if !modified {
            if let Some(found) = self.fetch(&name).await? {
                if hash_subscription(&clean_subscription(&found))? == stored.event_mesh_hash {
                    server = Some(found);
                } else {
                    debug!(eventmesh.name = %name, "Subscription changed on EventMesh, recreating it");
                    self.delete(&name).await?;
                    modified = true;
                }
            }
        }

        if server.is_some() && rotation_enabled && auth_hash != stored.webhook_auth_hash {
            if let Some(auth) = desired.webhook_auth.as_ref() {
                self.rotate_webhook_auth(&name, auth).await?;
            }
        }

        let created = server.is_none();
        let server = match server {
            Some(server) => server,
            None => {
                subscription.status_mut().initialize_event_types();
                self.create(&desired).await?;
                self.fetch(&name)
                    .await?
                    .ok_or_else(|| EventMeshError::MissingAfterCreate(name.clone()))?
            }
        };
        debug!(eventmesh.name = %name, modified, created, "EventMesh subscription in sync");

        record_types(subscription, &type_infos);
        let backend = &mut subscription.status_mut().backend;
        backend.ev2hash = desired_hash;
        backend.event_mesh_local_hash = local_hash;
        backend.event_mesh_hash = hash_subscription(&clean_subscription(&server))?;
        backend.webhook_auth_hash = auth_hash;
        let status_changed = mirror_status(backend, &server);

        Ok(created || status_changed)
    }

    async fn delete_subscription(&self, subscription: &Subscription) -> Result<(), EventMeshError> {
        self.delete(&self.mapped_name(subscription)).await
    }
}
