//! Shared fixtures for the integration tests
//!
//! The reconciler runs against [`MemoryStore`] and an in-process EventMesh
//! that counts the calls it serves.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use eventing_controller::config::{ControllerConfig, FeatureFlags};
use eventing_controller::controller::apirule::{AccessStrategy, KubeApiRuleManager};
use eventing_controller::controller::reconciler::{reconcile, Components, Reconciler, ReconcilerError};
use eventing_controller::crd::{
    ApiRuleResourceStatus, ApiRuleStatus, Subscription, SubscriptionSpec,
};
use eventing_controller::eventmesh::types::{
    self, AuthType, GrantType, ProtocolSettings, Response, State, StateAction, SubscriptionState,
    WebhookAuth,
};
use eventing_controller::eventmesh::{
    EventMesh, EventMeshClient, EventMeshCleaner, EventMeshError, EventMeshNameMapper,
    EventMeshSettings,
};
use eventing_controller::events::RecordingEventPublisher;
use eventing_controller::sink::ClusterLocalSinkValidator;
use eventing_controller::store::MemoryStore;
use kube::runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Install the ring crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub const NAMESPACE: &str = "ns1";
pub const DOMAIN: &str = "example.com";

/// EventMesh kept in memory
///
/// New subscriptions report `initial_state`; every call is recorded as
/// its HTTP method.
#[derive(Debug)]
pub struct RecordingEventMesh {
    subscriptions: Mutex<BTreeMap<String, types::Subscription>>,
    calls: Mutex<Vec<&'static str>>,
    initial_state: Mutex<SubscriptionState>,
}

impl Default for RecordingEventMesh {
    fn default() -> Self {
        Self {
            subscriptions: Mutex::default(),
            calls: Mutex::default(),
            initial_state: Mutex::new(SubscriptionState::Active),
        }
    }
}

impl RecordingEventMesh {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| **c == method).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_initial_state(&self, state: SubscriptionState) {
        *self.initial_state.lock().unwrap() = state;
    }

    /// Change the state of every stored subscription, as the server would
    pub fn set_state(&self, state: SubscriptionState) {
        for sub in self.subscriptions.lock().unwrap().values_mut() {
            sub.subscription_status = Some(state);
        }
    }

    /// Change stored subscriptions behind the controller's back
    pub fn tamper(&self, f: impl Fn(&mut types::Subscription)) {
        for sub in self.subscriptions.lock().unwrap().values_mut() {
            f(sub);
        }
    }

    pub fn subscriptions(&self) -> Vec<types::Subscription> {
        self.subscriptions.lock().unwrap().values().cloned().collect()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl EventMeshClient for RecordingEventMesh {
    async fn get(
        &self,
        name: &str,
    ) -> Result<(Option<types::Subscription>, Response), EventMeshError> {
        self.record("GET");
        Ok(match self.subscriptions.lock().unwrap().get(name) {
            Some(sub) => (Some(sub.clone()), Response::new(200, "")),
            None => (None, Response::new(404, "subscription not found")),
        })
    }

    async fn create(&self, subscription: &types::Subscription) -> Result<Response, EventMeshError> {
        self.record("POST");
        let mut stored = subscription.clone();
        stored.subscription_status = Some(*self.initial_state.lock().unwrap());
        self.subscriptions
            .lock()
            .unwrap()
            .insert(stored.name.clone(), stored);
        Ok(Response::new(201, ""))
    }

    async fn delete(&self, name: &str) -> Result<Response, EventMeshError> {
        self.record("DELETE");
        Ok(match self.subscriptions.lock().unwrap().remove(name) {
            Some(_) => Response::new(204, ""),
            None => Response::new(404, "subscription not found"),
        })
    }

    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<Response, EventMeshError> {
        self.record("PATCH");
        Ok(match self.subscriptions.lock().unwrap().get_mut(name) {
            Some(sub) => {
                sub.webhook_auth = Some(auth.clone());
                Response::new(204, "")
            }
            None => Response::new(404, "subscription not found"),
        })
    }

    async fn update_state(&self, name: &str, state: State) -> Result<Response, EventMeshError> {
        self.record("PUT");
        Ok(match self.subscriptions.lock().unwrap().get_mut(name) {
            Some(sub) => {
                sub.subscription_status = Some(match state.action {
                    StateAction::Pause => SubscriptionState::Paused,
                    StateAction::Resume => SubscriptionState::Active,
                });
                Response::new(202, "")
            }
            None => Response::new(404, "subscription not found"),
        })
    }
}

pub fn webhook_auth(secret: &str) -> WebhookAuth {
    WebhookAuth {
        auth_type: AuthType::OAuth2,
        grant_type: GrantType::ClientCredentials,
        client_id: "webhook-client".to_string(),
        client_secret: secret.to_string(),
        token_url: "https://oauth.example.com/token".to_string(),
    }
}

/// Store, EventMesh and event recorder shared by the reconcilers of a test
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub event_mesh: Arc<RecordingEventMesh>,
    pub events: Arc<RecordingEventPublisher>,
    pub reconciler: Arc<Reconciler>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_webhook_auth(false, "secret-1")
    }

    pub fn with_webhook_auth(enabled: bool, secret: &str) -> Self {
        let store = Arc::new(MemoryStore::new());
        let event_mesh = Arc::new(RecordingEventMesh::default());
        let events = Arc::new(RecordingEventPublisher::new());
        let reconciler = build_reconciler(&store, &event_mesh, &events, enabled, secret);
        Self {
            store,
            event_mesh,
            events,
            reconciler,
        }
    }

    /// A second controller on the same cluster and EventMesh, e.g. after a
    /// restart with rotated webhook credentials
    pub fn restart(&mut self, webhook_auth_enabled: bool, secret: &str) {
        self.reconciler = build_reconciler(
            &self.store,
            &self.event_mesh,
            &self.events,
            webhook_auth_enabled,
            secret,
        );
    }

    /// Apply a Subscription delivering to `http://<service>.ns1.svc.cluster.local:<port><path>`
    pub fn apply(&self, name: &str, service: &str, port: u16, path: &str, types: &[&str]) -> Subscription {
        self.store.add_service(NAMESPACE, service);
        let mut sub = Subscription::new(
            name,
            SubscriptionSpec {
                sink: format!("http://{service}.{NAMESPACE}.svc.cluster.local:{port}{path}"),
                source: "commerce".to_string(),
                types: types.iter().map(ToString::to_string).collect(),
                ..Default::default()
            },
        );
        sub.metadata.namespace = Some(NAMESPACE.to_string());
        self.store.apply_subscription(sub)
    }

    pub async fn reconcile(&self, name: &str) -> Result<Action, ReconcilerError> {
        let sub = self
            .store
            .subscription(NAMESPACE, name)
            .unwrap_or_else(|| panic!("subscription {name} not found"));
        reconcile(Arc::new(sub), self.reconciler.clone()).await
    }

    /// Report every APIRule in the namespace as ready
    pub fn make_api_rules_ready(&self) {
        for rule in self.store.api_rules(NAMESPACE) {
            let name = rule.metadata.name.clone().unwrap_or_default();
            self.store.set_api_rule_status(
                NAMESPACE,
                &name,
                ApiRuleStatus {
                    api_rule_status: Some(ApiRuleResourceStatus::ok()),
                    access_rule_status: Some(ApiRuleResourceStatus::ok()),
                    virtual_service_status: Some(ApiRuleResourceStatus::ok()),
                    last_processed_time: None,
                },
            );
        }
    }

    /// Reconcile until the APIRule exists, mark it ready and reconcile again
    pub async fn reconcile_to_ready(&self, name: &str) -> Action {
        self.reconcile(name).await.expect("first reconcile");
        self.make_api_rules_ready();
        self.reconcile(name).await.expect("second reconcile")
    }

    pub fn subscription(&self, name: &str) -> Subscription {
        self.store
            .subscription(NAMESPACE, name)
            .unwrap_or_else(|| panic!("subscription {name} not found"))
    }
}

fn build_reconciler(
    store: &Arc<MemoryStore>,
    event_mesh: &Arc<RecordingEventMesh>,
    events: &Arc<RecordingEventPublisher>,
    webhook_auth_enabled: bool,
    secret: &str,
) -> Arc<Reconciler> {
    let feature_flags = FeatureFlags::new(webhook_auth_enabled);
    let config = ControllerConfig {
        domain: DOMAIN.to_string(),
        feature_flags: feature_flags.clone(),
        ..Default::default()
    };
    let name_mapper = Arc::new(EventMeshNameMapper::new(
        DOMAIN,
        config.max_subscription_name_length,
    ));
    let engine = EventMesh::new(
        event_mesh.clone(),
        name_mapper.clone(),
        EventMeshSettings {
            namespace: "/default/sap.kyma/tunas".to_string(),
            event_type_prefix: "sap.kyma.custom".to_string(),
            protocol: ProtocolSettings::default(),
            webhook_auth: webhook_auth(secret),
        },
        feature_flags,
    );
    let strategy = if webhook_auth_enabled {
        AccessStrategy::Jwt {
            jwks_uri: "https://oauth.example.com/jwks".to_string(),
            trusted_issuer: "https://oauth.example.com".to_string(),
        }
    } else {
        AccessStrategy::OAuth2Introspection
    };
    let api_rules = KubeApiRuleManager::new(store.clone(), events.clone(), DOMAIN, strategy);

    Arc::new(Reconciler::new(
        Components {
            store: store.clone(),
            event_mesh: Arc::new(engine),
            api_rules: Arc::new(api_rules),
            sink_validator: Arc::new(ClusterLocalSinkValidator::new(store.clone())),
            cleaner: Arc::new(EventMeshCleaner),
            name_mapper,
            events: events.clone(),
        },
        config,
    ))
}
