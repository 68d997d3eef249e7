//! Construction of the desired APIRule for a set of Subscriptions.

use crate::constants::{
    API_RULE_NAME_PREFIX, CLUSTER_LOCAL_GATEWAY, CONTROLLER_NAME, EXTERNAL_HOST_PREFIX,
    HOST_SUFFIX_LENGTH, LABEL_CONTROLLER, LABEL_SERVICE,
};
use crate::crd::{ApiRule, ApiRuleService, ApiRuleSpec, Authenticator, Rule, Subscription};
use crate::sink::SinkTarget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};

pub const JWT_HANDLER: &str = "jwt";
pub const OAUTH_HANDLER: &str = "oauth2_introspection";
const ALLOWED_METHODS: [&str; 2] = ["POST", "OPTIONS"];

/// How the gateway authenticates calls from EventMesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStrategy {
    /// EventMesh fetches its own token, verified against the JWKS
    Jwt {
        jwks_uri: String,
        trusted_issuer: String,
    },
    OAuth2Introspection,
}

impl AccessStrategy {
    fn authenticator(&self) -> Authenticator {
        match self {
            AccessStrategy::Jwt {
                jwks_uri,
                trusted_issuer,
            } => Authenticator {
                handler: JWT_HANDLER.to_string(),
                config: Some(serde_json::json!({
                    "jwks_urls": [jwks_uri],
                    "trusted_issuers": [trusted_issuer],
                })),
            },
            AccessStrategy::OAuth2Introspection => Authenticator {
                handler: OAUTH_HANDLER.to_string(),
                config: None,
            },
        }
    }
}

/// Labels identifying the APIRules of one service
#[must_use]
pub fn labels(service: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_SERVICE.to_string(), service.to_string()),
        (LABEL_CONTROLLER.to_string(), CONTROLLER_NAME.to_string()),
    ])
}

/// `web-<random>.<domain>`
#[must_use]
pub fn random_host(domain: &str) -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(HOST_SUFFIX_LENGTH)
        .collect();
    format!("{EXTERNAL_HOST_PREFIX}-{suffix}.{domain}")
}

/// Owner references of the APIRule, one per Subscription, ordered by name
#[must_use]
pub fn owner_references(subscriptions: &[Subscription]) -> Vec<OwnerReference> {
    let mut refs: Vec<OwnerReference> = subscriptions
        .iter()
        .map(|sub| OwnerReference {
            api_version: Subscription::api_version(&()).to_string(),
            kind: Subscription::kind(&()).to_string(),
            name: sub.name_any(),
            uid: sub.uid().unwrap_or_default(),
            block_owner_deletion: Some(false),
            controller: Some(false),
        })
        .collect();
    refs.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.uid.cmp(&b.uid)));
    refs
}

/// One rule per distinct sink path of the given Subscriptions
#[must_use]
pub fn rules(subscriptions: &[Subscription], strategy: &AccessStrategy) -> Vec<Rule> {
    let paths: BTreeSet<String> = subscriptions
        .iter()
        .filter_map(|sub| SinkTarget::parse(&sub.spec.sink).ok())
        .map(|target| target.path)
        .collect();
    paths
        .into_iter()
        .map(|path| Rule {
            path,
            methods: ALLOWED_METHODS.iter().map(ToString::to_string).collect(),
            access_strategies: vec![strategy.authenticator()],
        })
        .collect()
}

/// The APIRule exposing `target` for `members`
#[must_use]
pub fn desired_api_rule(
    target: &SinkTarget,
    members: &[Subscription],
    domain: &str,
    strategy: &AccessStrategy,
) -> ApiRule {
    ApiRule {
        metadata: ObjectMeta {
            generate_name: Some(API_RULE_NAME_PREFIX.to_string()),
            namespace: Some(target.namespace.clone()),
            labels: Some(labels(&target.service)),
            owner_references: Some(owner_references(members)),
            ..Default::default()
        },
        spec: ApiRuleSpec {
            host: Some(random_host(domain)),
            service: Some(ApiRuleService {
                name: Some(target.service.clone()),
                port: Some(target.port),
            }),
            gateway: Some(CLUSTER_LOCAL_GATEWAY.to_string()),
            rules: rules(members, strategy),
        },
        status: None,
    }
}

/// Carry over what the gateway and the API server own: name, host,
/// resource version and status
pub fn apply_existing_attributes(existing: &ApiRule, desired: &mut ApiRule) {
    desired.metadata.name = existing.metadata.name.clone();
    desired.metadata.generate_name = existing.metadata.generate_name.clone();
    desired.metadata.resource_version = existing.metadata.resource_version.clone();
    desired.metadata.uid = existing.metadata.uid.clone();
    desired.spec.host = existing.spec.host.clone();
    desired.status = existing.status.clone();
}

/// Equality on the fields the controller writes
#[must_use]
pub fn same_api_rule(a: &ApiRule, b: &ApiRule) -> bool {
    a.metadata.labels == b.metadata.labels
        && a.metadata.owner_references == b.metadata.owner_references
        && a.spec == b.spec
}
