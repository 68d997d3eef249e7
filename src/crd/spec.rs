//! # Subscription Spec
//!
//! The main Subscription CRD definition.

use crate::constants::FINALIZER_NAME;
use crate::crd::SubscriptionStatus;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Subscription Custom Resource Definition
///
/// Describes which event types should be delivered to which sink.
///
/// # Example
///
/// ```yaml
/// apiVersion: eventing.kyma-project.io/v1alpha2
/// kind: Subscription
/// metadata:
///   name: order-created
///   namespace: shop
/// spec:
///   sink: http://orders.shop.svc.cluster.local/events
///   source: commerce
///   types:
///     - order.created.v1
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    kind = "Subscription",
    group = "eventing.kyma-project.io",
    version = "v1alpha2",
    namespaced,
    status = "SubscriptionStatus",
    shortname = "sub",
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Unique identifier of the subscription, kept for compatibility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// URL of the subscriber, must be a cluster-local service
    pub sink: String,
    /// How `types` are matched against published events
    #[serde(default)]
    pub type_matching: TypeMatching,
    /// Origin of the events
    #[serde(default)]
    pub source: String,
    /// Event types to subscribe to
    #[serde(default)]
    pub types: Vec<String>,
    /// Backend specific overrides (protocol settings, webhook auth)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

/// Event type matching mode
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TypeMatching {
    /// Types are cleaned and prefixed before being sent to the backend
    #[default]
    Standard,
    /// Types are forwarded untouched
    Exact,
}

impl Subscription {
    /// Event types without duplicates, in first-seen order
    #[must_use]
    pub fn unique_types(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.spec
            .types
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER_NAME)
    }

    /// Adds the controller finalizer, returns false when it was already present
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.finalizers_mut().push(FINALIZER_NAME.to_string());
        true
    }

    pub fn remove_finalizer(&mut self) {
        self.finalizers_mut().retain(|f| f != FINALIZER_NAME);
    }

    /// `namespace/name` key used in logs and backoff bookkeeping
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Status of the subscription, created empty on first access
    pub fn status_mut(&mut self) -> &mut SubscriptionStatus {
        self.status.get_or_insert_with(SubscriptionStatus::default)
    }
}
