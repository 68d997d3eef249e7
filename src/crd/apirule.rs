//! # APIRule
//!
//! Client side view of the `gateway.kyma-project.io/v1beta1` APIRule. Only the
//! fields this controller reads or writes are modelled; the CRD itself is
//! installed by the API gateway.

use crate::constants::EXTERNAL_SINK_SCHEME;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    kind = "APIRule",
    root = "ApiRule",
    group = "gateway.kyma-project.io",
    version = "v1beta1",
    plural = "apirules",
    namespaced,
    status = "ApiRuleStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ApiRuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ApiRuleService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Service exposed by the APIRule
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiRuleService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

/// Access rule for one path
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub path: String,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub access_strategies: Vec<Authenticator>,
}

/// Access strategy applied to a rule
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Authenticator {
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

/// Status written by the API gateway
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiRuleStatus {
    #[serde(rename = "APIRuleStatus", default, skip_serializing_if = "Option::is_none")]
    pub api_rule_status: Option<ApiRuleResourceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_rule_status: Option<ApiRuleResourceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_service_status: Option<ApiRuleResourceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed_time: Option<String>,
}

/// Status of one facet of the APIRule
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ApiRuleResourceStatus {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

/// Status code reported by a healthy facet
pub const STATUS_OK: &str = "OK";

impl ApiRuleResourceStatus {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: STATUS_OK.to_string(),
            desc: None,
        }
    }
}

impl ApiRule {
    /// Port of the exposed service
    #[must_use]
    pub fn service_port(&self) -> Option<u32> {
        self.spec.service.as_ref().and_then(|s| s.port)
    }

    /// Ready once the resource, access rule and virtual service all report OK
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let Some(status) = &self.status else {
            return false;
        };
        [
            &status.api_rule_status,
            &status.access_rule_status,
            &status.virtual_service_status,
        ]
        .iter()
        .all(|s| s.as_ref().is_some_and(|s| s.code == STATUS_OK))
    }

    /// `https://<host><path>`, the URL under which the sink is reachable
    /// from outside the cluster
    #[must_use]
    pub fn exposed_url(&self, sink_path: &str) -> Option<String> {
        let host = self.spec.host.as_deref().filter(|h| !h.is_empty())?;
        let path = if sink_path.starts_with('/') {
            sink_path.to_string()
        } else {
            format!("/{sink_path}")
        };
        Some(format!("{EXTERNAL_SINK_SCHEME}://{host}{path}"))
    }
}
