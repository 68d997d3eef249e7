//! In-process [`ObjectStore`] that mimics the API server semantics the
//! controller depends on: `generateName`, resource versions, uids, status
//! subresource writes and finalizer gated deletion.

use super::{ObjectStore, StoreError};
use crate::crd::{ApiRule, ApiRuleStatus, Subscription};
use async_trait::async_trait;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (String, String);

#[derive(Debug, Default)]
struct Objects {
    subscriptions: BTreeMap<Key, Subscription>,
    api_rules: BTreeMap<Key, ApiRule>,
    services: BTreeSet<Key>,
}

/// Object store kept in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<Objects>,
    resource_version: AtomicU64,
    writes: AtomicU64,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn object_key<K: ResourceExt>(obj: &K) -> Result<Key, StoreError> {
    let namespace = obj
        .namespace()
        .ok_or(StoreError::Invalid("metadata.namespace"))?;
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or(StoreError::Invalid("metadata.name"))?;
    Ok((namespace, name))
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn stamp(&self, meta: &mut ObjectMeta) {
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        meta.resource_version = Some(self.next_version());
    }

    fn check_version(
        kind: &'static str,
        (namespace, name): &Key,
        incoming: &ObjectMeta,
        stored: &ObjectMeta,
    ) -> Result<(), StoreError> {
        match &incoming.resource_version {
            Some(rv) if Some(rv) != stored.resource_version.as_ref() => Err(StoreError::Conflict {
                kind,
                namespace: namespace.clone(),
                name: name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Number of mutating calls served so far, seeding excluded
    #[must_use]
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Adds or replaces a Subscription as a user would, returns the stored copy
    pub fn apply_subscription(&self, mut subscription: Subscription) -> Subscription {
        let Ok(k) = object_key(&subscription) else {
            return subscription;
        };
        let mut objects = self.lock();
        if let Some(existing) = objects.subscriptions.get(&k) {
            subscription.metadata.uid = existing.metadata.uid.clone();
            subscription.metadata.finalizers = existing.metadata.finalizers.clone();
            subscription.status = existing.status.clone();
        }
        self.stamp(&mut subscription.metadata);
        objects.subscriptions.insert(k, subscription.clone());
        subscription
    }

    /// Deletes a Subscription as the API server would: objects carrying
    /// finalizers only get a deletion timestamp
    pub fn delete_subscription(&self, namespace: &str, name: &str) {
        let mut objects = self.lock();
        let k = key(namespace, name);
        let Some(sub) = objects.subscriptions.get_mut(&k) else {
            return;
        };
        if sub.finalizers().is_empty() {
            objects.subscriptions.remove(&k);
            return;
        }
        if sub.metadata.deletion_timestamp.is_none() {
            sub.metadata.deletion_timestamp =
                serde_json::from_value(serde_json::Value::String(chrono::Utc::now().to_rfc3339()))
                    .ok();
            sub.metadata.resource_version = Some(self.next_version());
        }
    }

    pub fn add_service(&self, namespace: &str, name: &str) {
        self.lock().services.insert(key(namespace, name));
    }

    #[must_use]
    pub fn subscription(&self, namespace: &str, name: &str) -> Option<Subscription> {
        self.lock().subscriptions.get(&key(namespace, name)).cloned()
    }

    #[must_use]
    pub fn api_rules(&self, namespace: &str) -> Vec<ApiRule> {
        self.lock()
            .api_rules
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, rule)| rule.clone())
            .collect()
    }

    /// Sets the gateway status of one APIRule
    pub fn set_api_rule_status(&self, namespace: &str, name: &str, status: ApiRuleStatus) {
        let mut objects = self.lock();
        if let Some(rule) = objects.api_rules.get_mut(&key(namespace, name)) {
            rule.status = Some(status);
            rule.metadata.resource_version = Some(self.next_version());
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_subscription(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscription(namespace, name))
    }

    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .lock()
            .subscriptions
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, sub)| sub.clone())
            .collect())
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError> {
        let k = object_key(subscription)?;
        let mut objects = self.lock();
        let stored = objects
            .subscriptions
            .get(&k)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Subscription",
                namespace: k.0.clone(),
                name: k.1.clone(),
            })?;
        Self::check_version("Subscription", &k, &subscription.metadata, &stored.metadata)?;

        let mut updated = subscription.clone();
        updated.status = stored.status.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        self.record_write();

        if updated.is_being_deleted() && updated.finalizers().is_empty() {
            objects.subscriptions.remove(&k);
            return Ok(updated);
        }
        self.stamp(&mut updated.metadata);
        objects.subscriptions.insert(k, updated.clone());
        Ok(updated)
    }

    async fn update_subscription_status(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError> {
        let k = object_key(subscription)?;
        let mut objects = self.lock();
        let stored = objects
            .subscriptions
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound {
                kind: "Subscription",
                namespace: k.0.clone(),
                name: k.1.clone(),
            })?;
        Self::check_version("Subscription", &k, &subscription.metadata, &stored.metadata)?;

        stored.status = subscription.status.clone();
        stored.metadata.resource_version = Some(self.next_version());
        self.record_write();
        Ok(stored.clone())
    }

    async fn get_api_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ApiRule>, StoreError> {
        Ok(self.lock().api_rules.get(&key(namespace, name)).cloned())
    }

    async fn list_api_rules(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ApiRule>, StoreError> {
        Ok(self
            .api_rules(namespace)
            .into_iter()
            .filter(|rule| {
                let rule_labels = rule.labels();
                labels.iter().all(|(k, v)| rule_labels.get(k) == Some(v))
            })
            .collect())
    }

    async fn create_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError> {
        let mut created = api_rule.clone();
        if created.metadata.name.is_none() {
            let prefix = created
                .metadata
                .generate_name
                .clone()
                .ok_or(StoreError::Invalid("metadata.name or metadata.generateName"))?;
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            created.metadata.name = Some(format!("{prefix}{}", &suffix[..5]));
        }
        let k = object_key(&created)?;
        let mut objects = self.lock();
        if objects.api_rules.contains_key(&k) {
            return Err(StoreError::Conflict {
                kind: "APIRule",
                namespace: k.0,
                name: k.1,
            });
        }
        created.metadata.uid = None;
        self.stamp(&mut created.metadata);
        self.record_write();
        objects.api_rules.insert(k, created.clone());
        Ok(created)
    }

    async fn update_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError> {
        let k = object_key(api_rule)?;
        let mut objects = self.lock();
        let stored = objects.api_rules.get(&k).ok_or_else(|| StoreError::NotFound {
            kind: "APIRule",
            namespace: k.0.clone(),
            name: k.1.clone(),
        })?;
        Self::check_version("APIRule", &k, &api_rule.metadata, &stored.metadata)?;

        let mut updated = api_rule.clone();
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.status = stored.status.clone();
        self.stamp(&mut updated.metadata);
        self.record_write();
        objects.api_rules.insert(k, updated.clone());
        Ok(updated)
    }

    async fn delete_api_rule(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        if self.lock().api_rules.remove(&key(namespace, name)).is_some() {
            self.record_write();
        }
        Ok(())
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        Ok(self.lock().services.contains(&key(namespace, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{ApiRuleSpec, SubscriptionSpec};

    fn subscription(name: &str) -> Subscription {
        let mut sub = Subscription::new(
            name,
            SubscriptionSpec {
                sink: "http://svc.ns.svc.cluster.local".to_string(),
                ..Default::default()
            },
        );
        sub.metadata.namespace = Some("ns".to_string());
        sub
    }

    #[tokio::test]
    async fn test_generate_name_and_uid_on_create() {
        let store = MemoryStore::new();
        let mut rule = ApiRule::new("", ApiRuleSpec::default());
        rule.metadata.name = None;
        rule.metadata.generate_name = Some("webhook-".to_string());
        rule.metadata.namespace = Some("ns".to_string());

        let created = store.create_api_rule(&rule).await.unwrap();
        let name = created.metadata.name.clone().unwrap();
        assert!(name.starts_with("webhook-"));
        assert_eq!(name.len(), "webhook-".len() + 5);
        assert!(created.metadata.uid.is_some());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let stored = store.apply_subscription(subscription("a"));

        let mut first = stored.clone();
        first.add_finalizer();
        store.update_subscription(&first).await.unwrap();

        let mut stale = stored;
        stale.add_finalizer();
        let err = store.update_subscription(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_write_keeps_spec_and_spec_write_keeps_status() {
        let store = MemoryStore::new();
        let mut sub = store.apply_subscription(subscription("a"));
        sub.status_mut().ready = true;
        let sub = store.update_subscription_status(&sub).await.unwrap();

        let mut meta_only = sub.clone();
        meta_only.status = None;
        meta_only.add_finalizer();
        store.update_subscription(&meta_only).await.unwrap();

        let stored = store.subscription("ns", "a").unwrap();
        assert!(stored.has_finalizer());
        assert!(stored.status.is_some_and(|s| s.ready));
    }

    #[tokio::test]
    async fn test_finalizer_gates_deletion() {
        let store = MemoryStore::new();
        let mut sub = store.apply_subscription(subscription("a"));
        sub.add_finalizer();
        store.update_subscription(&sub).await.unwrap();

        store.delete_subscription("ns", "a");
        let mut deleting = store.subscription("ns", "a").unwrap();
        assert!(deleting.is_being_deleted());

        deleting.remove_finalizer();
        store.update_subscription(&deleting).await.unwrap();
        assert!(store.subscription("ns", "a").is_none());
    }
}
