//! # EventMesh REST Client
//!
//! Thin client for the EventMesh subscription API. Every call returns the
//! status code and body so the sync engine can decide which codes it
//! tolerates. Requests are authorized with an OAuth2 client-credentials
//! token that is cached until shortly before it expires.

use crate::config::OAuth2Credentials;
use crate::constants::{DEFAULT_HTTP_TIMEOUT_SECS, TOKEN_EXPIRY_LEEWAY_SECS};
use crate::eventmesh::types::{Response, State, Subscription, WebhookAuth};
use crate::eventmesh::EventMeshError;
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Calls against the EventMesh subscription API
#[async_trait]
pub trait EventMeshClient: Send + Sync {
    /// `GET /subscriptions/{name}`, the subscription is only decoded on 200
    async fn get(&self, name: &str) -> Result<(Option<Subscription>, Response), EventMeshError>;

    /// `POST /subscriptions`
    async fn create(&self, subscription: &Subscription) -> Result<Response, EventMeshError>;

    /// `DELETE /subscriptions/{name}`
    async fn delete(&self, name: &str) -> Result<Response, EventMeshError>;

    /// `PATCH /subscriptions/{name}` with the new webhook auth block
    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<Response, EventMeshError>;

    /// `PUT /subscriptions/{name}/state`
    async fn update_state(&self, name: &str, state: State) -> Result<Response, EventMeshError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        ChronoDuration::try_seconds(TOKEN_EXPIRY_LEEWAY_SECS)
            .and_then(|leeway| self.expires_at.checked_sub_signed(leeway))
            .is_some_and(|refresh_at| refresh_at > Utc::now())
    }
}

/// Expiry of a token issued at `now` and valid for `expires_in` seconds
///
/// Lifetimes beyond the representable range saturate: a huge positive one
/// never expires, a huge negative one is already expired.
fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    ChronoDuration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(if expires_in < 0 {
            now
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}

/// [`EventMeshClient`] over HTTPS
pub struct RestEventMeshClient {
    http: reqwest::Client,
    base_url: String,
    credentials: OAuth2Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for RestEventMeshClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestEventMeshClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl RestEventMeshClient {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        credentials: OAuth2Credentials,
    ) -> Result<Self, EventMeshError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    fn subscription_url(&self, name: &str) -> String {
        format!("{}/subscriptions/{name}", self.base_url)
    }

    async fn access_token(&self) -> Result<String, EventMeshError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        debug!(token_url = %self.credentials.token_url, "Fetching EventMesh access token");
        let response = self
            .http
            .post(&self.credentials.token_url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body("grant_type=client_credentials")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EventMeshError::Token(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| EventMeshError::Token(e.to_string()))?;

        let expires_in = token.expires_in.unwrap_or(3600);
        let fresh = CachedToken {
            value: token.access_token,
            expires_at: token_expiry(Utc::now(), expires_in),
        };
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Send one request, retrying once with a new token on 401
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, String), EventMeshError> {
        let mut retried = false;
        loop {
            let token = self.access_token().await?;
            let mut request = self
                .http
                .request(method.clone(), url)
                .bearer_auth(token)
                .header(ACCEPT, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;
            let status = response.status();
            metrics::increment_eventmesh_requests(method.as_str(), status.as_u16());

            if status == StatusCode::UNAUTHORIZED && !retried {
                warn!(%url, "EventMesh rejected the access token, fetching a new one");
                self.invalidate_token().await;
                retried = true;
                continue;
            }
            let text = response.text().await?;
            return Ok((status, text));
        }
    }
}

fn response(status: StatusCode, body: String) -> Response {
    Response::new(status.as_u16(), body)
}

#[async_trait]
impl EventMeshClient for RestEventMeshClient {
    async fn get(&self, name: &str) -> Result<(Option<Subscription>, Response), EventMeshError> {
        let (status, body) = self
            .send(Method::GET, &self.subscription_url(name), None)
            .await?;
        if status != StatusCode::OK {
            return Ok((None, response(status, body)));
        }
        let subscription: Subscription = serde_json::from_str(&body)?;
        Ok((Some(subscription), response(status, String::new())))
    }

    async fn create(&self, subscription: &Subscription) -> Result<Response, EventMeshError> {
        let url = format!("{}/subscriptions", self.base_url);
        let body = serde_json::to_value(subscription)?;
        let (status, text) = self.send(Method::POST, &url, Some(&body)).await?;
        Ok(response(status, text))
    }

    async fn delete(&self, name: &str) -> Result<Response, EventMeshError> {
        let (status, text) = self
            .send(Method::DELETE, &self.subscription_url(name), None)
            .await?;
        Ok(response(status, text))
    }

    async fn update_webhook_auth(
        &self,
        name: &str,
        auth: &WebhookAuth,
    ) -> Result<Response, EventMeshError> {
        let body = json!({ "webhookAuth": auth });
        let (status, text) = self
            .send(Method::PATCH, &self.subscription_url(name), Some(&body))
            .await?;
        Ok(response(status, text))
    }

    async fn update_state(&self, name: &str, state: State) -> Result<Response, EventMeshError> {
        let url = format!("{}/state", self.subscription_url(name));
        let body = serde_json::to_value(state)?;
        let (status, text) = self.send(Method::PUT, &url, Some(&body)).await?;
        Ok(response(status, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_freshness_respects_leeway() {
        let token = CachedToken {
            value: "t".to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(TOKEN_EXPIRY_LEEWAY_SECS / 2),
        };
        assert!(!token.is_fresh());

        let token = CachedToken {
            value: "t".to_string(),
            expires_at: Utc::now() + ChronoDuration::seconds(3600),
        };
        assert!(token.is_fresh());
    }

    #[test]
    fn test_token_expiry_saturates_out_of_range_lifetimes() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, 3600), now + ChronoDuration::seconds(3600));
        assert_eq!(token_expiry(now, i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(token_expiry(now, i64::MIN), now);

        let forever = CachedToken {
            value: "t".to_string(),
            expires_at: token_expiry(now, i64::MAX),
        };
        assert!(forever.is_fresh());

        let expired = CachedToken {
            value: "t".to_string(),
            expires_at: token_expiry(now, -60),
        };
        assert!(!expired.is_fresh());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client =
            RestEventMeshClient::new("https://ems.example.com/sap/ems/v1/", OAuth2Credentials::default())
                .unwrap();
        assert_eq!(
            client.subscription_url("abc"),
            "https://ems.example.com/sap/ems/v1/subscriptions/abc"
        );
    }
}
