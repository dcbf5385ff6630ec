//! Route definitions: the device WebSocket upgrade endpoint and the
//! liveness probe (spec §4.12 — "HTTP `GET /` ... returns a text liveness
//! string; any non-upgrade request falls through to that").

use std::net::SocketAddr;

use axum::Router;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use serde::Deserialize;

use crate::connection::{ConnectCtx, handle_connection};
use crate::state::SharedState;

/// URL-query fallback for `device-id`/`client-id`/`authorization` (spec §6).
#[derive(Debug, Deserialize, Default)]
pub struct ConnectQuery {
    #[serde(rename = "device-id")]
    pub device_id: Option<String>,
    #[serde(rename = "client-id")]
    pub client_id: Option<String>,
    pub authorization: Option<String>,
    /// `?from=mqtt_gateway` selects the framed-audio variant (spec §4.2).
    pub from: Option<String>,
}

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/ws", get(ws_upgrade))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "voice-gateway: ok"
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let ctx = ConnectCtx::resolve(&headers, &query, remote_addr);
    ws.on_upgrade(move |socket| handle_connection(state, socket, ctx))
}
