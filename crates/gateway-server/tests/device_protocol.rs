//! Device protocol shape tests that don't require a working ASR/TTS/LLM
//! vendor adapter: the `hello` handshake, `abort`, and unknown message
//! types being ignored rather than closing the connection.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::handshake::client::generate_key;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;

fn ws_request(addr: std::net::SocketAddr) -> Request<()> {
    Request::builder()
        .uri(format!("ws://{addr}/ws"))
        .header("Host", addr.to_string())
        .header("Connection", "Upgrade")
        .header("Upgrade", "websocket")
        .header("Sec-WebSocket-Version", "13")
        .header("Sec-WebSocket-Key", generate_key())
        .header("device-id", "device-proto-test")
        .header("client-id", "device-proto-test")
        .body(())
        .expect("build ws request")
}

async fn connect_with_auth_disabled(addr: std::net::SocketAddr) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let (stream, _) = connect_async(ws_request(addr)).await.expect("connect");
    stream
}

#[tokio::test]
async fn hello_response_carries_session_id_and_audio_params() {
    let addr = common::spawn_server(|config| config.auth.enabled = false).await;
    let stream = connect_with_auth_disabled(addr).await;
    let (_write, mut read) = stream.split();

    let first = read.next().await.expect("stream closed").expect("ws error");
    let Message::Text(text) = first else { panic!("expected text frame") };
    let hello: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(hello["type"], "hello");
    assert!(!hello["session_id"].as_str().unwrap().is_empty());
    assert_eq!(hello["audio_params"]["format"], "opus");
}

#[tokio::test]
async fn abort_message_does_not_close_the_connection() {
    let addr = common::spawn_server(|config| config.auth.enabled = false).await;
    let stream = connect_with_auth_disabled(addr).await;
    let (mut write, mut read) = stream.split();

    let _hello = read.next().await.expect("stream closed").expect("ws error");

    write
        .send(Message::Text(json!({"type": "abort", "reason": "wake_word"}).to_string().into()))
        .await
        .expect("send abort");

    // The connection should still be alive and accept a follow-up hello
    // announcement rather than having been closed in response to abort.
    write
        .send(Message::Text(json!({"type": "hello", "features": {"mcp": false}}).to_string().into()))
        .await
        .expect("send hello after abort");

    write.close(None).await.ok();
}

#[tokio::test]
async fn unrecognized_message_type_is_ignored_not_fatal() {
    let addr = common::spawn_server(|config| config.auth.enabled = false).await;
    let stream = connect_with_auth_disabled(addr).await;
    let (mut write, mut read) = stream.split();

    let _hello = read.next().await.expect("stream closed").expect("ws error");

    write
        .send(Message::Text(json!({"type": "something_from_a_newer_firmware"}).to_string().into()))
        .await
        .expect("send unknown message");

    // Prove the connection is still open: a subsequent well-formed listen
    // message doesn't error out either.
    write
        .send(Message::Text(json!({"type": "listen", "state": "start", "mode": "manual"}).to_string().into()))
        .await
        .expect("send listen after unknown message");

    write.close(None).await.ok();
}
