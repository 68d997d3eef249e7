//! # Sink Validation
//!
//! A Subscription may only deliver to a cluster-local service living in
//! its own namespace. [`SinkValidator`] is consulted before any APIRule or
//! EventMesh work happens.

mod target;

pub use target::{SinkTarget, SinkUrlError};

use crate::constants::CLUSTER_LOCAL_SUFFIX;
use crate::crd::Subscription;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;

/// Sink validation errors
#[derive(Debug, thiserror::Error)]
pub enum SinkValidationError {
    #[error(transparent)]
    Url(#[from] SinkUrlError),
    #[error("sink does not contain suffix: {0} in the URL")]
    NotClusterLocal(String),
    #[error("sink should contain 5 sub-domains: {0}")]
    SubDomains(String),
    #[error("namespace of subscription: {subscription} and the namespace of subscriber: {subscriber} are different")]
    NamespaceMismatch {
        subscription: String,
        subscriber: String,
    },
    #[error("sink is not valid cluster local svc: {namespace}/{name} not found")]
    ServiceNotFound { namespace: String, name: String },
    #[error("fetch cluster-local svc failed namespace:{namespace} name:{name}: {source}")]
    Lookup {
        namespace: String,
        name: String,
        source: StoreError,
    },
}

impl SinkValidationError {
    /// Only a failed service lookup is worth a backoff, everything else
    /// needs the user to fix the Subscription
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        !matches!(self, SinkValidationError::Lookup { .. })
    }
}

/// Checks the sink of a Subscription
#[async_trait]
pub trait SinkValidator: Send + Sync {
    /// # Errors
    ///
    /// Returns an error when the sink is not a reachable cluster-local service.
    async fn validate(&self, subscription: &Subscription) -> Result<SinkTarget, SinkValidationError>;
}

/// Accepts `http(s)://<service>.<namespace>.svc.cluster.local[:port]/path`
/// when the service exists in the Subscription's namespace
pub struct ClusterLocalSinkValidator {
    store: Arc<dyn ObjectStore>,
}

impl ClusterLocalSinkValidator {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SinkValidator for ClusterLocalSinkValidator {
    async fn validate(&self, subscription: &Subscription) -> Result<SinkTarget, SinkValidationError> {
        let target = SinkTarget::parse(&subscription.spec.sink)?;

        if !target.host.ends_with(CLUSTER_LOCAL_SUFFIX) {
            return Err(SinkValidationError::NotClusterLocal(
                CLUSTER_LOCAL_SUFFIX.to_string(),
            ));
        }
        if target.host.split('.').count() != 5 {
            return Err(SinkValidationError::SubDomains(target.host));
        }

        let namespace = subscription.namespace().unwrap_or_default();
        if namespace != target.namespace {
            return Err(SinkValidationError::NamespaceMismatch {
                subscription: namespace,
                subscriber: target.namespace,
            });
        }

        match self
            .store
            .service_exists(&target.namespace, &target.service)
            .await
        {
            Ok(true) => Ok(target),
            Ok(false) => Err(SinkValidationError::ServiceNotFound {
                namespace: target.namespace,
                name: target.service,
            }),
            Err(source) => Err(SinkValidationError::Lookup {
                namespace: target.namespace,
                name: target.service,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::SubscriptionSpec;
    use crate::store::MemoryStore;

    fn subscription(sink: &str) -> Subscription {
        let mut sub = Subscription::new(
            "sub",
            SubscriptionSpec {
                sink: sink.to_string(),
                ..Default::default()
            },
        );
        sub.metadata.namespace = Some("ns1".to_string());
        sub
    }

    fn validator() -> ClusterLocalSinkValidator {
        let store = MemoryStore::new();
        store.add_service("ns1", "svc1");
        ClusterLocalSinkValidator::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_valid_sink() {
        let target = validator()
            .validate(&subscription("https://svc1.ns1.svc.cluster.local/path"))
            .await
            .unwrap();
        assert_eq!(target.service, "svc1");
        assert_eq!(target.path, "/path");
    }

    #[tokio::test]
    async fn test_rejected_sinks_are_skippable() {
        let v = validator();
        for sink in [
            "svc1.ns1.svc.cluster.local",
            "http://svc1.ns1.example.com",
            "http://svc1.ns1.svc.cluster.local.extra",
            "http://svc1.other.svc.cluster.local",
            "http://svc2.ns1.svc.cluster.local",
        ] {
            let err = v.validate(&subscription(sink)).await.unwrap_err();
            assert!(err.is_skippable(), "{sink}: {err}");
        }
    }

    #[tokio::test]
    async fn test_namespace_mismatch_message() {
        let err = validator()
            .validate(&subscription("http://svc1.other.svc.cluster.local"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "namespace of subscription: ns1 and the namespace of subscriber: other are different"
        );
    }
}
