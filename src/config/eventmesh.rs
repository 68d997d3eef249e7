//! # EventMesh Configuration
//!
//! Connection, credential and protocol settings for the EventMesh backend.

use crate::config::env::{env_var_or_default_bool, env_var_or_default_str};
use crate::config::ConfigError;
use crate::constants::DEFAULT_QOS;
use crate::eventmesh::types::{AuthType, GrantType, ProtocolSettings, Qos, WebhookAuth};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// OAuth2 client credentials
///
/// Secrets are wiped when the value is dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct OAuth2Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl OAuth2Credentials {
    /// The webhook auth block EventMesh uses with these credentials
    #[must_use]
    pub fn webhook_auth(&self) -> WebhookAuth {
        WebhookAuth {
            auth_type: AuthType::OAuth2,
            grant_type: GrantType::ClientCredentials,
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            token_url: self.token_url.clone(),
        }
    }
}

/// Settings for talking to EventMesh
#[derive(Debug, Clone, Default)]
pub struct EventMeshConfig {
    /// Base URL of the subscription API
    pub api_url: String,
    /// Credentials of the controller itself
    pub credentials: OAuth2Credentials,
    /// Credentials EventMesh presents when calling webhooks
    pub webhook_credentials: OAuth2Credentials,
    /// EventMesh namespace, used as event source when none is given
    pub namespace: String,
    /// Prefix of every processed event type
    pub event_type_prefix: String,
    /// Defaults for protocol settings
    pub protocol: ProtocolSettings,
}

impl EventMeshConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error for a missing API URL or an invalid protocol setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        let content_mode = env_var_or_default_str("CONTENT_MODE", "");
        let qos = env_var_or_default_str("QOS", DEFAULT_QOS);
        let config = Self {
            api_url: env_var_or_default_str("EVENT_MESH_API_URL", ""),
            credentials: OAuth2Credentials {
                client_id: env_var_or_default_str("EVENT_MESH_CLIENT_ID", ""),
                client_secret: env_var_or_default_str("EVENT_MESH_CLIENT_SECRET", ""),
                token_url: env_var_or_default_str("EVENT_MESH_TOKEN_URL", ""),
            },
            webhook_credentials: OAuth2Credentials {
                client_id: env_var_or_default_str("WEBHOOK_CLIENT_ID", ""),
                client_secret: env_var_or_default_str("WEBHOOK_CLIENT_SECRET", ""),
                token_url: env_var_or_default_str("WEBHOOK_TOKEN_ENDPOINT", ""),
            },
            namespace: env_var_or_default_str("EVENT_MESH_NAMESPACE", ""),
            event_type_prefix: env_var_or_default_str("EVENT_TYPE_PREFIX", ""),
            protocol: ProtocolSettings {
                content_mode: if content_mode.is_empty() {
                    None
                } else {
                    Some(content_mode.parse().map_err(ConfigError::Invalid)?)
                },
                exempt_handshake: env_var_or_default_bool("EXEMPT_HANDSHAKE", true),
                qos: qos
                    .parse::<Qos>()
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?,
            },
        };
        if config.api_url.is_empty() {
            return Err(ConfigError::Missing("EVENT_MESH_API_URL"));
        }
        Ok(config)
    }
}
