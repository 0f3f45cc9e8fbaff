//! HTTP Backend Integration Tests
//!
//! Request and response mapping of the invoke adapter against a mock server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stream_manager::{
    BackendError, ConnectionState, HttpBackendConfig, HttpStreamBackend, StreamBackend,
};

fn backend_for(server: &MockServer) -> HttpStreamBackend {
    HttpStreamBackend::new(&HttpBackendConfig {
        base_url: server.uri(),
        timeout: Duration::from_secs(2),
    })
    .unwrap()
}

fn keys(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

#[tokio::test]
async fn subscribe_posts_symbols() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/subscribe_price_stream"))
        .and(body_json(json!({"symbols": ["SOL", "BONK"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
        .expect(1)
        .mount(&server)
        .await;

    backend_for(&server)
        .subscribe_price_stream(&keys(&["SOL", "BONK"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn wallet_calls_post_addresses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/unsubscribe_wallet_stream"))
        .and(body_json(json!({"addresses": ["wallet1"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    backend_for(&server)
        .unsubscribe_wallet_stream(&keys(&["wallet1"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn reconnect_posts_provider_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/reconnect_stream"))
        .and(body_json(json!({"providerId": "helius"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    backend_for(&server).reconnect_stream("helius").await.unwrap();
}

#[tokio::test]
async fn status_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/get_stream_status"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "provider": "birdeye",
                "state": "Connected",
                "lastMessageAt": "2026-01-15T12:00:00Z",
                "statistics": {"messagesReceived": 10, "bytesReceived": 2048}
            },
            {
                "provider": "helius",
                "state": "Reconnecting",
                "fallback": {"active": true, "reason": "websocket closed"}
            }
        ])))
        .mount(&server)
        .await;

    let statuses = backend_for(&server).get_stream_status().await.unwrap();

    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].state, ConnectionState::Connected);
    assert!(statuses[0].last_message_at.is_some());
    assert_eq!(statuses[1].state, ConnectionState::Reconnecting);
    assert!(statuses[1].is_fallback_active());
}

#[tokio::test]
async fn non_success_is_rejection_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/reconnect_stream"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown provider: nope"))
        .mount(&server)
        .await;

    let err = backend_for(&server).reconnect_stream("nope").await.unwrap_err();

    assert_eq!(
        err,
        BackendError::Rejected {
            command: "reconnect_stream".to_string(),
            message: "unknown provider: nope".to_string(),
        }
    );
}

#[tokio::test]
async fn malformed_status_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/invoke/get_stream_status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
        .mount(&server)
        .await;

    let err = backend_for(&server).get_stream_status().await.unwrap_err();

    assert!(matches!(err, BackendError::Decode(_)));
}

#[tokio::test]
async fn unreachable_backend_is_transport_error() {
    let server = MockServer::start().await;
    let backend = backend_for(&server);
    drop(server);

    let err = backend
        .subscribe_price_stream(&keys(&["SOL"]))
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Transport(_)));
}
