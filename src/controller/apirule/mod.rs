//! # APIRule Lifecycle
//!
//! Every cluster-local service receiving events from EventMesh is exposed by
//! exactly one APIRule per port. Subscriptions sharing a `(service, port)`
//! share the APIRule: each one is an owner reference and each distinct sink
//! path is a rule.
//!
//! When a Subscription moves to another APIRule, or is deleted, it is removed
//! from the previous APIRule. An APIRule without owners is deleted.

mod builder;

pub use builder::{AccessStrategy, JWT_HANDLER, OAUTH_HANDLER};

use crate::config::ControllerConfig;
use crate::crd::{ApiRule, Subscription};
use crate::events::{actions, reasons, EventPublisher};
use crate::observability::increment_apirule_operations;
use crate::sink::SinkTarget;
use crate::store::{label_selector, ObjectStore, StoreError};
use async_trait::async_trait;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info};

/// APIRule sync errors
#[derive(Debug, thiserror::Error)]
pub enum ApiRuleSyncError {
    /// The gateway has not reported the APIRule ready yet
    #[error("apiRule {name} is not ready")]
    NotReady {
        name: String,
        api_rule: Box<ApiRule>,
    },
    #[error("failed to fetch APIRules for labels={labels}: {source}")]
    List { labels: String, source: StoreError },
    #[error("failed to fetch subscriptions for subscriber namespace={namespace}, name={service}: {source}")]
    Members {
        namespace: String,
        service: String,
        source: StoreError,
    },
    #[error("failed to create APIRule: {0}")]
    Create(StoreError),
    #[error("failed to update APIRule {name}: {source}")]
    Update { name: String, source: StoreError },
    #[error("failed to release APIRule {name}: {source}")]
    Release { name: String, source: StoreError },
}

impl ApiRuleSyncError {
    /// Skippable errors are resolved by a later watch event
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(self, ApiRuleSyncError::NotReady { .. })
    }

    /// The APIRule that exists despite the error
    #[must_use]
    pub fn api_rule(&self) -> Option<&ApiRule> {
        match self {
            ApiRuleSyncError::NotReady { api_rule, .. } => Some(api_rule),
            _ => None,
        }
    }
}

/// Manages the APIRule exposing the sink of a Subscription
#[async_trait]
pub trait ApiRuleManager: Send + Sync {
    /// Creates or updates the APIRule for `target` and records its name and
    /// the external sink on the Subscription status
    ///
    /// # Errors
    ///
    /// [`ApiRuleSyncError::NotReady`] while the gateway has not reported the
    /// APIRule ready, a hard error when the API server calls fail.
    async fn sync(
        &self,
        subscription: &mut Subscription,
        target: &SinkTarget,
    ) -> Result<ApiRule, ApiRuleSyncError>;

    /// Removes the Subscription from the APIRule it is recorded on
    ///
    /// # Errors
    ///
    /// Returns an error when the APIRule cannot be updated or deleted.
    async fn release(&self, subscription: &Subscription) -> Result<(), ApiRuleSyncError>;
}

/// [`ApiRuleManager`] backed by an [`ObjectStore`]
pub struct KubeApiRuleManager {
    store: Arc<dyn ObjectStore>,
    events: Arc<dyn EventPublisher>,
    domain: String,
    strategy: AccessStrategy,
}

impl KubeApiRuleManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventPublisher>,
        domain: impl Into<String>,
        strategy: AccessStrategy,
    ) -> Self {
        Self {
            store,
            events,
            domain: domain.into(),
            strategy,
        }
    }

    /// JWT when EventMesh authenticates webhook calls itself
    #[must_use]
    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventPublisher>,
        config: &ControllerConfig,
    ) -> Self {
        let strategy = if config.feature_flags.webhook_auth_enabled() {
            AccessStrategy::Jwt {
                jwks_uri: config.jwks_uri.clone(),
                trusted_issuer: config.trusted_issuer.clone(),
            }
        } else {
            AccessStrategy::OAuth2Introspection
        };
        Self::new(store, events, config.domain.clone(), strategy)
    }

    /// Non-deleting Subscriptions delivering to the same service and port
    async fn members(
        &self,
        subscription: &Subscription,
        target: &SinkTarget,
    ) -> Result<Vec<Subscription>, ApiRuleSyncError> {
        let listed = self
            .store
            .list_subscriptions(&target.namespace)
            .await
            .map_err(|source| ApiRuleSyncError::Members {
                namespace: target.namespace.clone(),
                service: target.service.clone(),
                source,
            })?;
        let uid = subscription.uid();
        let mut members: Vec<Subscription> = listed
            .into_iter()
            .filter(|sub| sub.uid() != uid)
            .filter(|sub| !sub.is_being_deleted())
            .filter(|sub| {
                SinkTarget::parse(&sub.spec.sink).is_ok_and(|t| t.same_backend(target))
            })
            .collect();
        members.push(subscription.clone());
        Ok(members)
    }

    async fn publish(&self, subscription: &Subscription, warning: bool, reason: &str, note: String) {
        let type_ = if warning {
            EventType::Warning
        } else {
            EventType::Normal
        };
        self.events
            .publish(
                &subscription.object_ref(&()),
                type_,
                reason,
                actions::SYNC_API_RULE,
                Some(note),
            )
            .await;
    }

    async fn create(
        &self,
        subscription: &Subscription,
        desired: &ApiRule,
    ) -> Result<ApiRule, ApiRuleSyncError> {
        match self.store.create_api_rule(desired).await {
            Ok(created) => {
                let name = created.name_any();
                info!(namespace = %created.namespace().unwrap_or_default(), name = %name, "Created APIRule");
                increment_apirule_operations("create");
                self.publish(subscription, false, reasons::CREATE, format!("Create APIRule succeeded {name}"))
                    .await;
                Ok(created)
            }
            Err(e) => {
                let name = desired.metadata.generate_name.clone().unwrap_or_default();
                self.publish(subscription, true, reasons::CREATE_FAILED, format!("Create APIRule failed {name}"))
                    .await;
                Err(ApiRuleSyncError::Create(e))
            }
        }
    }

    async fn update(
        &self,
        subscription: &Subscription,
        desired: &ApiRule,
    ) -> Result<ApiRule, ApiRuleSyncError> {
        let name = desired.name_any();
        match self.store.update_api_rule(desired).await {
            Ok(updated) => {
                info!(namespace = %updated.namespace().unwrap_or_default(), name = %name, "Updated APIRule");
                increment_apirule_operations("update");
                self.publish(subscription, false, reasons::UPDATE, format!("Update APIRule succeeded {name}"))
                    .await;
                Ok(updated)
            }
            Err(source) => {
                self.publish(subscription, true, reasons::UPDATE_FAILED, format!("Update APIRule failed {name}"))
                    .await;
                Err(ApiRuleSyncError::Update { name, source })
            }
        }
    }

    /// Drops `subscription` from the owners of APIRule `name`
    ///
    /// The APIRule is deleted once nobody owns it. Otherwise its owners and
    /// rules are rebuilt from the remaining Subscriptions recorded on it.
    async fn detach(&self, subscription: &Subscription, name: &str) -> Result<(), ApiRuleSyncError> {
        let release_err = |source| ApiRuleSyncError::Release {
            name: name.to_string(),
            source,
        };
        let namespace = subscription.namespace().unwrap_or_default();
        let Some(mut previous) = self
            .store
            .get_api_rule(&namespace, name)
            .await
            .map_err(release_err)?
        else {
            return Ok(());
        };

        let uid = subscription.uid().unwrap_or_default();
        let owners = previous.owner_references();
        let remaining = owners.iter().filter(|o| o.uid != uid).count();

        if remaining == 0 {
            self.store
                .delete_api_rule(&namespace, name)
                .await
                .map_err(release_err)?;
            increment_apirule_operations("delete");
            info!(namespace = %namespace, name = %name, "Deleted APIRule without owners");
            return Ok(());
        }
        if remaining == owners.len() {
            return Ok(());
        }

        let subscriptions: Vec<Subscription> = self
            .store
            .list_subscriptions(&namespace)
            .await
            .map_err(release_err)?
            .into_iter()
            .filter(|sub| sub.uid().unwrap_or_default() != uid)
            .filter(|sub| {
                sub.status
                    .as_ref()
                    .and_then(|s| s.backend.api_rule_name.as_deref())
                    == Some(name)
            })
            .collect();
        previous.metadata.owner_references = Some(builder::owner_references(&subscriptions));
        previous.spec.rules = builder::rules(&subscriptions, &self.strategy);
        self.store
            .update_api_rule(&previous)
            .await
            .map_err(release_err)?;
        increment_apirule_operations("update");
        debug!(namespace = %namespace, name = %name, owners = remaining, "Removed subscription from previous APIRule");
        Ok(())
    }
}

fn recorded_api_rule(subscription: &Subscription) -> Option<String> {
    subscription
        .status
        .as_ref()
        .and_then(|s| s.backend.api_rule_name.clone())
        .filter(|name| !name.is_empty())
}

#[async_trait]
impl ApiRuleManager for KubeApiRuleManager {
    async fn sync(
        &self,
        subscription: &mut Subscription,
        target: &SinkTarget,
    ) -> Result<ApiRule, ApiRuleSyncError> {
        let labels = builder::labels(&target.service);
        let reusable = self
            .store
            .list_api_rules(&target.namespace, &labels)
            .await
            .map_err(|source| ApiRuleSyncError::List {
                labels: label_selector(&labels),
                source,
            })?
            .into_iter()
            .find(|rule| rule.service_port() == Some(target.port));

        let members = self.members(subscription, target).await?;
        let mut desired = builder::desired_api_rule(target, &members, &self.domain, &self.strategy);

        if let Some(previous) = recorded_api_rule(subscription) {
            if reusable.as_ref().map(ResourceExt::name_any).as_deref() != Some(previous.as_str()) {
                self.detach(subscription, &previous).await?;
            }
        }

        let api_rule = match reusable {
            None => self.create(subscription, &desired).await?,
            Some(existing) => {
                debug!(namespace = %target.namespace, name = %existing.name_any(), service = %target.service, "Reusing APIRule");
                builder::apply_existing_attributes(&existing, &mut desired);
                if builder::same_api_rule(&existing, &desired) {
                    existing
                } else {
                    self.update(subscription, &desired).await?
                }
            }
        };

        let name = api_rule.name_any();
        let backend = &mut subscription.status_mut().backend;
        backend.api_rule_name = Some(name.clone());

        if !api_rule.is_ready() {
            return Err(ApiRuleSyncError::NotReady {
                name,
                api_rule: Box::new(api_rule),
            });
        }
        backend.external_sink = api_rule.exposed_url(&target.path);
        Ok(api_rule)
    }

    async fn release(&self, subscription: &Subscription) -> Result<(), ApiRuleSyncError> {
        match recorded_api_rule(subscription) {
            Some(name) => self.detach(subscription, &name).await,
            None => Ok(()),
        }
    }
}
