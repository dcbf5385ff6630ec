//! Device WebSocket authentication (spec §6): allow-list bypass, a disabled
//! auth config, and HMAC token verification.

mod common;

use futures_util::{SinkExt, StreamExt};
use gateway_core::AuthVerifier;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;

fn ws_request(addr: std::net::SocketAddr, device_id: &str, authorization: Option<&str>) -> Request<()> {
    let mut builder = Request::builder()
        .uri(format!("ws://{addr}/ws"))
        .header("Host", addr.to_string())
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .header("device-id", device_id)
        .header("client-id", device_id);
    if let Some(auth) = authorization {
        builder = builder.header("authorization", auth);
    }
    builder.body(()).expect("build ws request")
}

#[tokio::test]
async fn disabled_auth_accepts_any_device() {
    let addr = common::spawn_server(|config| {
        config.auth.enabled = false;
    })
    .await;

    let (ws_stream, _) = connect_async(ws_request(addr, "unregistered-device", None)).await.expect("connect");
    let (_write, mut read) = ws_stream.split();

    let first = read.next().await.expect("stream closed unexpectedly").expect("ws error");
    let Message::Text(text) = first else { panic!("expected a text frame, got {first:?}") };
    let hello: Value = serde_json::from_str(&text).expect("hello is valid json");
    assert_eq!(hello["type"], "hello");
    assert!(hello["session_id"].is_string());
}

#[tokio::test]
async fn allow_listed_device_bypasses_token() {
    let addr = common::spawn_server(|config| {
        config.auth.allow_list.push("trusted-device".to_string());
    })
    .await;

    let (ws_stream, _) = connect_async(ws_request(addr, "trusted-device", None)).await.expect("connect");
    let (_write, mut read) = ws_stream.split();

    let first = read.next().await.expect("stream closed unexpectedly").expect("ws error");
    let Message::Text(text) = first else { panic!("expected a text frame, got {first:?}") };
    let hello: Value = serde_json::from_str(&text).expect("hello is valid json");
    assert_eq!(hello["type"], "hello");
}

#[tokio::test]
async fn valid_hmac_token_is_accepted() {
    let secret = "integration-test-secret";
    let device_id = "device-with-token";
    let addr = common::spawn_server(|config| {
        config.auth.secret_key = secret.to_string();
    })
    .await;

    let verifier = AuthVerifier::new(secret.to_string(), 3600);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let token = verifier.generate(device_id, device_id, now);

    let (ws_stream, _) = connect_async(ws_request(addr, device_id, Some(&format!("Bearer {token}")))).await.expect("connect");
    let (_write, mut read) = ws_stream.split();

    let first = read.next().await.expect("stream closed unexpectedly").expect("ws error");
    let Message::Text(text) = first else { panic!("expected a text frame, got {first:?}") };
    let hello: Value = serde_json::from_str(&text).expect("hello is valid json");
    assert_eq!(hello["type"], "hello");
}

#[tokio::test]
async fn missing_token_is_rejected_with_no_bind_hook() {
    let addr = common::spawn_server(|config| {
        config.auth.secret_key = "some-secret".to_string();
    })
    .await;

    let (ws_stream, _) = connect_async(ws_request(addr, "unknown-device", None)).await.expect("connect");
    let (mut write, mut read) = ws_stream.split();

    let first = read.next().await.expect("stream closed unexpectedly").expect("ws error");
    let Message::Text(text) = first else { panic!("expected a text frame, got {first:?}") };
    let envelope: Value = serde_json::from_str(&text).expect("envelope is valid json");
    assert_eq!(envelope["type"], "server");
    assert_eq!(envelope["status"], "error");

    let _ = write.close(None).await;
}
