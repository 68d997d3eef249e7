//! # EventMesh Wire Model
//!
//! Request and response bodies of the EventMesh subscription API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A subscription as sent to and returned by EventMesh
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_mode: Option<ContentMode>,
    #[serde(default)]
    pub exempt_handshake: bool,
    #[serde(default)]
    pub qos: Qos,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_auth: Option<WebhookAuth>,
    /// Set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<SubscriptionState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subscription_status_reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_successful_delivery: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_failed_delivery: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_failed_delivery_reason: String,
}

/// One subscribed event
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Event {
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
}

/// Credentials EventMesh uses when calling the webhook
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAuth {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub grant_type: GrantType,
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
}

impl fmt::Debug for WebhookAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookAuth")
            .field("auth_type", &self.auth_type)
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthType {
    #[default]
    #[serde(rename = "oauth2")]
    OAuth2,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum GrantType {
    #[default]
    #[serde(rename = "client_credentials")]
    ClientCredentials,
}

/// Delivery guarantee requested from EventMesh
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Qos {
    #[default]
    AtLeastOnce,
    AtMostOnce,
}

/// Error returned for an unsupported quality of service
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid Qos: {0}")]
pub struct InvalidQos(pub String);

impl FromStr for Qos {
    type Err = InvalidQos;

    /// Accepts both `AT_LEAST_ONCE` and `AT-LEAST-ONCE` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().replace('-', "_").as_str() {
            "AT_LEAST_ONCE" => Ok(Qos::AtLeastOnce),
            "AT_MOST_ONCE" => Ok(Qos::AtMostOnce),
            _ => Err(InvalidQos(s.to_string())),
        }
    }
}

/// Event encoding used for webhook calls
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentMode {
    Binary,
    Structured,
}

impl FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BINARY" => Ok(ContentMode::Binary),
            "STRUCTURED" => Ok(ContentMode::Structured),
            other => Err(format!("invalid content mode: {other}")),
        }
    }
}

/// Lifecycle state reported by EventMesh
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Paused,
    Pending,
    Deleting,
    #[serde(other)]
    Unknown,
}

impl SubscriptionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionState::Active => "Active",
            SubscriptionState::Paused => "Paused",
            SubscriptionState::Pending => "Pending",
            SubscriptionState::Deleting => "Deleting",
            SubscriptionState::Unknown => "Unknown",
        }
    }
}

/// Body of `PUT /subscriptions/{name}/state`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    pub action: StateAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StateAction {
    Pause,
    Resume,
}

impl State {
    #[must_use]
    pub fn pause() -> Self {
        Self {
            action: StateAction::Pause,
        }
    }

    #[must_use]
    pub fn resume() -> Self {
        Self {
            action: StateAction::Resume,
        }
    }
}

/// Status code and message of an EventMesh call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status_code: u16,
    pub message: String,
}

impl Response {
    #[must_use]
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
        }
    }
}

/// Protocol settings applied when a Subscription does not override them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub content_mode: Option<ContentMode>,
    pub exempt_handshake: bool,
    pub qos: Qos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_parsing_normalizes_dashes() {
        assert_eq!("AT_LEAST_ONCE".parse::<Qos>().unwrap(), Qos::AtLeastOnce);
        assert_eq!("AT-MOST-ONCE".parse::<Qos>().unwrap(), Qos::AtMostOnce);
        let err = "EXACTLY_ONCE".parse::<Qos>().unwrap_err();
        assert_eq!(err.to_string(), "invalid Qos: EXACTLY_ONCE");
    }

    #[test]
    fn test_subscription_wire_format() {
        let sub = Subscription {
            name: "abc".to_string(),
            content_mode: Some(ContentMode::Structured),
            exempt_handshake: true,
            qos: Qos::AtMostOnce,
            webhook_url: "https://web.example.com/".to_string(),
            events: vec![Event {
                source: "ns".to_string(),
                event_type: "prefix.app.order.created.v1".to_string(),
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["contentMode"], "STRUCTURED");
        assert_eq!(json["qos"], "AT_MOST_ONCE");
        assert_eq!(json["webhookUrl"], "https://web.example.com/");
        assert_eq!(json["events"][0]["type"], "prefix.app.order.created.v1");
        assert!(json.get("subscriptionStatus").is_none());
        assert!(json.get("webhookAuth").is_none());
    }

    #[test]
    fn test_unknown_state_is_tolerated() {
        let sub: Subscription = serde_json::from_value(serde_json::json!({
            "name": "abc",
            "subscriptionStatus": "Migrating"
        }))
        .unwrap();
        assert_eq!(sub.subscription_status, Some(SubscriptionState::Unknown));
    }

    #[test]
    fn test_state_body() {
        assert_eq!(
            serde_json::to_string(&State::pause()).unwrap(),
            r#"{"action":"pause"}"#
        );
    }
}
