//! # Object Store
//!
//! The controller reads and writes Kubernetes objects only through
//! [`ObjectStore`]. [`KubeStore`] talks to the API server; [`MemoryStore`]
//! keeps everything in process and is used by tests and local tooling.
//!
//! Updates use optimistic concurrency: the `resourceVersion` of the object
//! passed in must match the stored one, otherwise [`StoreError::Conflict`]
//! is returned.

mod kube;
mod memory;

pub use self::kube::KubeStore;
pub use self::memory::MemoryStore;

use crate::crd::{ApiRule, Subscription};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Errors returned by an [`ObjectStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("conflict updating {kind} {namespace}/{name}: the object has been modified")]
    Conflict {
        kind: &'static str,
        namespace: String,
        name: String,
    },
    #[error("object is missing {0}")]
    Invalid(&'static str),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] ::kube::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Kube(::kube::Error::Api(api_err)) => api_err.code == 404,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::Conflict { .. } => true,
            StoreError::Kube(::kube::Error::Api(api_err)) => api_err.code == 409,
            _ => false,
        }
    }
}

/// Typed access to the objects the controller works with
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_subscription(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError>;

    /// Writes metadata and spec, the status is ignored
    async fn update_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError>;

    /// Writes the status subresource only
    async fn update_subscription_status(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError>;

    async fn get_api_rule(&self, namespace: &str, name: &str)
        -> Result<Option<ApiRule>, StoreError>;

    /// APIRules in `namespace` carrying every label in `labels`
    async fn list_api_rules(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ApiRule>, StoreError>;

    /// Creates the APIRule, honouring `generateName`
    async fn create_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError>;

    async fn update_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError>;

    async fn delete_api_rule(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError>;
}

/// Renders a label map as a Kubernetes label selector
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}
