//! [`ObjectStore`] backed by the Kubernetes API server.

use super::{label_selector, ObjectStore, StoreError};
use crate::crd::{ApiRule, Subscription};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;

/// Object store using a kube [`Client`]
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn subscriptions(&self, namespace: &str) -> Api<Subscription> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_rules(&self, namespace: &str) -> Api<ApiRule> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.namespace().ok_or(StoreError::Invalid("metadata.namespace"))
}

fn name_of<K: ResourceExt>(obj: &K) -> Result<String, StoreError> {
    obj.meta()
        .name
        .clone()
        .ok_or(StoreError::Invalid("metadata.name"))
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_subscription(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        Ok(self.subscriptions(namespace).get_opt(name).await?)
    }

    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>, StoreError> {
        Ok(self
            .subscriptions(namespace)
            .list(&ListParams::default())
            .await?
            .items)
    }

    async fn update_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError> {
        let api = self.subscriptions(&namespace_of(subscription)?);
        Ok(api
            .replace(&name_of(subscription)?, &PostParams::default(), subscription)
            .await?)
    }

    async fn update_subscription_status(
        &self,
        subscription: &Subscription,
    ) -> Result<Subscription, StoreError> {
        let api = self.subscriptions(&namespace_of(subscription)?);
        let data = serde_json::to_vec(subscription)?;
        Ok(api
            .replace_status(&name_of(subscription)?, &PostParams::default(), data)
            .await?)
    }

    async fn get_api_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ApiRule>, StoreError> {
        Ok(self.api_rules(namespace).get_opt(name).await?)
    }

    async fn list_api_rules(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<ApiRule>, StoreError> {
        let params = ListParams::default().labels(&label_selector(labels));
        Ok(self.api_rules(namespace).list(&params).await?.items)
    }

    async fn create_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError> {
        let api = self.api_rules(&namespace_of(api_rule)?);
        Ok(api.create(&PostParams::default(), api_rule).await?)
    }

    async fn update_api_rule(&self, api_rule: &ApiRule) -> Result<ApiRule, StoreError> {
        let api = self.api_rules(&namespace_of(api_rule)?);
        Ok(api
            .replace(&name_of(api_rule)?, &PostParams::default(), api_rule)
            .await?)
    }

    async fn delete_api_rule(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self
            .api_rules(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, StoreError> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(services.get_opt(name).await?.is_some())
    }
}
