//! # Conversion
//!
//! Builds the EventMesh subscription a Subscription resource should map to
//! and the cleaned projection used for drift detection.

use crate::config::env::parse_bool;
use crate::crd::{Subscription, TypeMatching};
use crate::eventmesh::event_types::EventTypeInfo;
use crate::eventmesh::types::{
    self, AuthType, ContentMode, Event, GrantType, ProtocolSettings, Qos, WebhookAuth,
};
use std::collections::BTreeMap;

pub const CONFIG_CONTENT_MODE: &str = "contentMode";
pub const CONFIG_EXEMPT_HANDSHAKE: &str = "exemptHandshake";
pub const CONFIG_QOS: &str = "qos";
pub const CONFIG_WEBHOOK_AUTH_TYPE: &str = "webhookAuthType";
pub const CONFIG_WEBHOOK_AUTH_GRANT_TYPE: &str = "webhookAuthGrantType";
pub const CONFIG_WEBHOOK_AUTH_CLIENT_ID: &str = "webhookAuthClientID";
pub const CONFIG_WEBHOOK_AUTH_CLIENT_SECRET: &str = "webhookAuthClientSecret";
pub const CONFIG_WEBHOOK_AUTH_TOKEN_URL: &str = "webhookAuthTokenURL";

const CLIENT_CREDENTIALS: &str = "client_credentials";

/// Errors raised while converting a Subscription
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error(transparent)]
    Qos(#[from] types::InvalidQos),
    #[error("{0}")]
    ContentMode(String),
    #[error("invalid {key}: {value}")]
    WebhookAuth { key: &'static str, value: String },
}

/// Inputs that do not come from the Subscription itself
#[derive(Debug, Clone, Copy)]
pub struct ConversionDefaults<'a> {
    pub protocol: &'a ProtocolSettings,
    pub webhook_auth: &'a WebhookAuth,
    /// EventMesh namespace, the event source for standard matching
    pub namespace: &'a str,
}

/// Build the desired EventMesh subscription
///
/// # Errors
///
/// Returns an error when a per-subscription override holds an unsupported
/// value.
pub fn to_event_mesh_subscription(
    name: String,
    subscription: &Subscription,
    type_infos: &[EventTypeInfo],
    webhook_url: String,
    defaults: ConversionDefaults<'_>,
) -> Result<types::Subscription, ConvertError> {
    let config = &subscription.spec.config;
    let protocol = protocol_settings(config, defaults.protocol)?;
    let webhook_auth = webhook_auth(config, defaults.webhook_auth)?;

    let source = match subscription.spec.type_matching {
        TypeMatching::Exact if !subscription.spec.source.is_empty() => {
            subscription.spec.source.clone()
        }
        _ => defaults.namespace.to_string(),
    };
    let events = type_infos
        .iter()
        .map(|info| Event {
            source: source.clone(),
            event_type: info.processed_type.clone(),
        })
        .collect();

    Ok(types::Subscription {
        name,
        content_mode: protocol.content_mode,
        exempt_handshake: protocol.exempt_handshake,
        qos: protocol.qos,
        webhook_url,
        events,
        webhook_auth: Some(webhook_auth),
        ..Default::default()
    })
}

/// Protocol settings after applying the Subscription's overrides
///
/// # Errors
///
/// Returns an error for an unknown content mode or QoS.
pub fn protocol_settings(
    config: &BTreeMap<String, String>,
    defaults: &ProtocolSettings,
) -> Result<ProtocolSettings, ConvertError> {
    let mut settings = defaults.clone();
    if let Some(mode) = config.get(CONFIG_CONTENT_MODE) {
        settings.content_mode = Some(mode.parse::<ContentMode>().map_err(ConvertError::ContentMode)?);
    }
    if let Some(exempt) = config.get(CONFIG_EXEMPT_HANDSHAKE) {
        settings.exempt_handshake = parse_bool(exempt);
    }
    if let Some(qos) = config.get(CONFIG_QOS) {
        settings.qos = qos.parse::<Qos>()?;
    }
    Ok(settings)
}

/// The webhook auth block: the configured one unless the Subscription
/// brings its own
///
/// # Errors
///
/// Returns an error when the override uses another type or grant type than
/// client credentials.
pub fn webhook_auth(
    config: &BTreeMap<String, String>,
    default: &WebhookAuth,
) -> Result<WebhookAuth, ConvertError> {
    let Some(auth_type) = config.get(CONFIG_WEBHOOK_AUTH_TYPE) else {
        return Ok(default.clone());
    };
    if auth_type != CLIENT_CREDENTIALS {
        return Err(ConvertError::WebhookAuth {
            key: CONFIG_WEBHOOK_AUTH_TYPE,
            value: auth_type.clone(),
        });
    }
    let grant_type = config
        .get(CONFIG_WEBHOOK_AUTH_GRANT_TYPE)
        .map(String::as_str)
        .unwrap_or_default();
    if grant_type != CLIENT_CREDENTIALS {
        return Err(ConvertError::WebhookAuth {
            key: CONFIG_WEBHOOK_AUTH_GRANT_TYPE,
            value: grant_type.to_string(),
        });
    }
    let value = |key: &str| config.get(key).cloned().unwrap_or_default();
    Ok(WebhookAuth {
        auth_type: AuthType::OAuth2,
        grant_type: GrantType::ClientCredentials,
        client_id: value(CONFIG_WEBHOOK_AUTH_CLIENT_ID),
        client_secret: value(CONFIG_WEBHOOK_AUTH_CLIENT_SECRET),
        token_url: value(CONFIG_WEBHOOK_AUTH_TOKEN_URL),
    })
}

/// The fields of a subscription that only the controller decides on
///
/// Credentials and everything the server reports about delivery are
/// dropped, so a subscription stored on EventMesh and the one built
/// locally compare equal when nothing relevant changed.
#[must_use]
pub fn clean_subscription(subscription: &types::Subscription) -> types::Subscription {
    let mut events = subscription.events.clone();
    events.sort();
    types::Subscription {
        name: subscription.name.clone(),
        content_mode: subscription.content_mode,
        exempt_handshake: subscription.exempt_handshake,
        qos: subscription.qos,
        webhook_url: subscription.webhook_url.clone(),
        events,
        ..Default::default()
    }
}
