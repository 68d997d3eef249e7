//! Pact contract tests for the EventMesh subscription API
//!
//! These tests define the contract between the eventing controller and
//! EventMesh. Every interaction is exercised through `RestEventMeshClient`,
//! including the OAuth2 token request that precedes it.

mod common;

use common::init_rustls;
use eventing_controller::config::OAuth2Credentials;
use eventing_controller::eventmesh::types::{
    Event, Qos, State, Subscription, SubscriptionState, WebhookAuth,
};
use eventing_controller::eventmesh::{EventMeshClient, EventMeshError, RestEventMeshClient};
use pact_consumer::prelude::*;
use serde_json::json;

const CONSUMER: &str = "Eventing-Controller";
const PROVIDER: &str = "EventMesh";
const BASIC_AUTH: &str = "Basic ZXZlbnRpbmctY29udHJvbGxlcjpjbGllbnQtc2VjcmV0";
const NAME: &str = "order-sub1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b1c2";

fn add_token_interaction(pact_builder: &mut PactBuilder) {
    pact_builder.interaction("request an access token", "", |mut i| {
        i.given("the controller has valid client credentials");
        i.request
            .method("POST")
            .path("/oauth/token")
            .header("authorization", BASIC_AUTH);
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "access_token": "test-token",
                "token_type": "bearer",
                "expires_in": 3600
            }));
        i
    });
}

fn client_for(base_url: &str) -> RestEventMeshClient {
    RestEventMeshClient::new(
        base_url,
        OAuth2Credentials {
            client_id: "eventing-controller".to_string(),
            client_secret: "client-secret".to_string(),
            token_url: format!("{base_url}/oauth/token"),
        },
    )
    .expect("Failed to build EventMesh client")
}

/// Mock server URL without the trailing slash
fn base_url(url: impl ToString) -> String {
    url.to_string().trim_end_matches('/').to_string()
}

fn subscription() -> Subscription {
    Subscription {
        name: NAME.to_string(),
        content_mode: None,
        exempt_handshake: true,
        qos: Qos::AtLeastOnce,
        webhook_url: "https://web-abcdefghij.example.com/orders".to_string(),
        events: vec![Event {
            source: "/default/sap.kyma/tunas".to_string(),
            event_type: "sap.kyma.custom.commerce.order.created.v1".to_string(),
        }],
        webhook_auth: Some(common::webhook_auth("webhook-secret")),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_eventmesh_get_subscription_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("get an existing subscription", "", |mut i| {
        i.given("the subscription exists and is active");
        i.request
            .method("GET")
            .path(format!("/subscriptions/{NAME}"))
            .header("authorization", "Bearer test-token");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "name": NAME,
                "exemptHandshake": true,
                "qos": "AT_LEAST_ONCE",
                "webhookUrl": "https://web-abcdefghij.example.com/orders",
                "events": [{
                    "source": "/default/sap.kyma/tunas",
                    "type": "sap.kyma.custom.commerce.order.created.v1"
                }],
                "subscriptionStatus": "Active",
                "lastSuccessfulDelivery": "2026-01-01T00:00:00Z"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let (sub, response) = client.get(NAME).await.expect("GET failed");
    assert_eq!(response.status_code, 200);
    let sub = sub.expect("subscription is decoded on 200");
    assert_eq!(sub.subscription_status, Some(SubscriptionState::Active));
    assert_eq!(sub.events.len(), 1);
    assert_eq!(sub.last_successful_delivery, "2026-01-01T00:00:00Z");
}

#[tokio::test]
async fn test_eventmesh_get_missing_subscription_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("get a subscription that does not exist", "", |mut i| {
        i.given("the subscription does not exist");
        i.request
            .method("GET")
            .path(format!("/subscriptions/{NAME}"))
            .header("authorization", "Bearer test-token");
        i.response
            .status(404)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "subscription not found" }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let (sub, response) = client.get(NAME).await.expect("GET failed");
    assert!(sub.is_none());
    assert_eq!(response.status_code, 404);
    assert!(response.message.contains("subscription not found"));
}

#[tokio::test]
async fn test_eventmesh_create_subscription_contract() {
    init_rustls();
    let sub = subscription();
    let body = serde_json::to_value(&sub).expect("subscription serializes");

    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("create a subscription", "", |mut i| {
        i.given("no subscription with that name exists");
        i.request
            .method("POST")
            .path("/subscriptions")
            .header("authorization", "Bearer test-token")
            .json_body(body.clone());
        i.response
            .status(201)
            .header("content-type", "application/json")
            .json_body(json!({ "message": "Subscription created" }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let response = client.create(&sub).await.expect("POST failed");
    assert_eq!(response.status_code, 201);
}

#[tokio::test]
async fn test_eventmesh_delete_subscription_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("delete a subscription", "", |mut i| {
        i.given("the subscription exists");
        i.request
            .method("DELETE")
            .path(format!("/subscriptions/{NAME}"))
            .header("authorization", "Bearer test-token");
        i.response.status(204);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let response = client.delete(NAME).await.expect("DELETE failed");
    assert_eq!(response.status_code, 204);
}

#[tokio::test]
async fn test_eventmesh_pause_subscription_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("pause a subscription", "", |mut i| {
        i.given("the subscription exists and is active");
        i.request
            .method("PUT")
            .path(format!("/subscriptions/{NAME}/state"))
            .header("authorization", "Bearer test-token")
            .json_body(json!({ "action": "pause" }));
        i.response.status(202);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let response = client
        .update_state(NAME, State::pause())
        .await
        .expect("PUT failed");
    assert_eq!(response.status_code, 202);
}

#[tokio::test]
async fn test_eventmesh_update_webhook_auth_contract() {
    init_rustls();
    let auth: WebhookAuth = common::webhook_auth("rotated-secret");
    let body = json!({ "webhookAuth": serde_json::to_value(&auth).expect("auth serializes") });

    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    add_token_interaction(&mut pact_builder);
    pact_builder.interaction("replace the webhook auth of a subscription", "", |mut i| {
        i.given("the subscription exists and is paused");
        i.request
            .method("PATCH")
            .path(format!("/subscriptions/{NAME}"))
            .header("authorization", "Bearer test-token")
            .json_body(body.clone());
        i.response.status(204);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let response = client
        .update_webhook_auth(NAME, &auth)
        .await
        .expect("PATCH failed");
    assert_eq!(response.status_code, 204);
}

#[tokio::test]
async fn test_eventmesh_rejected_credentials_contract() {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    pact_builder.interaction("request an access token with revoked credentials", "", |mut i| {
        i.given("the controller credentials were revoked");
        i.request
            .method("POST")
            .path("/oauth/token")
            .header("authorization", BASIC_AUTH);
        i.response
            .status(401)
            .header("content-type", "application/json")
            .json_body(json!({ "error": "invalid_client" }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    let err = client.delete(NAME).await.unwrap_err();
    assert!(matches!(err, EventMeshError::Token(_)), "unexpected error: {err}");
    assert!(err.to_string().contains("401"));
}

async fn delete_with_token_lifetime(expires_in: i64, deletes: usize) {
    init_rustls();
    let mut pact_builder = PactBuilder::new(CONSUMER, PROVIDER);
    pact_builder.interaction(
        format!("request an access token valid for {expires_in} seconds"),
        String::new(),
        |mut i| {
            i.given("the token endpoint reports an unusual token lifetime");
            i.request
                .method("POST")
                .path("/oauth/token")
                .header("authorization", BASIC_AUTH);
            i.response
                .status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "access_token": "test-token",
                    "token_type": "bearer",
                    "expires_in": expires_in
                }));
            i
        },
    );
    pact_builder.interaction("delete a subscription", "", |mut i| {
        i.given("the subscription exists");
        i.request
            .method("DELETE")
            .path(format!("/subscriptions/{NAME}"))
            .header("authorization", "Bearer test-token");
        i.response.status(204);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(&base_url(mock_server.url()));

    for _ in 0..deletes {
        let response = client.delete(NAME).await.expect("DELETE failed");
        assert_eq!(response.status_code, 204);
    }
}

#[tokio::test]
async fn test_eventmesh_token_with_huge_lifetime_contract() {
    delete_with_token_lifetime(i64::MAX, 2).await;
}

#[tokio::test]
async fn test_eventmesh_token_with_negative_lifetime_contract() {
    delete_with_token_lifetime(-1, 2).await;
}
