//! Composition root: turns a [`GatewayConfig`] plus the embedder's injected
//! seams into a running Axum server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use gateway_core::{AsrProvider, AuthVerifier, EmotionHook, GatewayConfig, LlmEngine, MemoryStore, TtsProvider, VadProvider};
use gateway_mcp::{LocalFunction, ServerMcpClient};
use tokio::net::TcpListener;
use tracing::info;

use crate::state::{AppState, BindPromptPlayer, ModuleFactory, ReportSink, RestartHook, SharedState};

/// Everything the embedder supplies beyond the plain [`GatewayConfig`]:
/// the vendor adapter factory and the optional hooks with no vendor-neutral
/// default behavior.
pub struct BootstrapInputs {
    pub config: GatewayConfig,
    pub modules: Arc<dyn ModuleFactory>,

    pub shared_vad: Option<Arc<dyn VadProvider>>,
    pub shared_local_asr: Option<Arc<dyn AsrProvider>>,

    pub local_tools: Vec<Arc<dyn LocalFunction>>,
    pub server_mcp_clients: Vec<Arc<ServerMcpClient>>,

    pub memory: Option<Arc<dyn MemoryStore>>,
    pub emotion: Option<Arc<dyn EmotionHook>>,
    pub bind_prompt: Option<Arc<dyn BindPromptPlayer>>,
    pub restart_hook: Option<Arc<dyn RestartHook>>,
    pub report_sink: Option<Arc<dyn ReportSink>>,

    pub admin_secret: Option<String>,
}

/// Builds the shared [`AppState`] from [`BootstrapInputs`]. Kept separate
/// from [`start_server`] so an embedder can mount [`crate::routes::create_router`]
/// on their own Axum app instead of handing over the whole process.
pub fn bootstrap(inputs: BootstrapInputs) -> SharedState {
    let auth = AuthVerifier::new(inputs.config.auth.secret_key.clone(), inputs.config.auth.expire_seconds);

    Arc::new(AppState {
        config: inputs.config,
        auth,
        modules: inputs.modules,
        shared_vad: inputs.shared_vad,
        shared_local_asr: inputs.shared_local_asr,
        local_tools: inputs.local_tools,
        server_mcp_clients: inputs.server_mcp_clients,
        memory: inputs.memory,
        emotion: inputs.emotion,
        bind_prompt: inputs.bind_prompt,
        restart_hook: inputs.restart_hook,
        report_sink: inputs.report_sink,
        admin_secret: inputs.admin_secret,
    })
}

/// Binds `addr` and serves the device WebSocket endpoint until the process
/// is killed. `into_make_service_with_connect_info` is required here since
/// `routes::ws_upgrade` extracts the peer's `SocketAddr`.
pub async fn start_server(state: SharedState, addr: SocketAddr) -> Result<()> {
    let router = crate::routes::create_router(state);
    let listener = TcpListener::bind(addr).await.context("failed to bind listener")?;
    info!(%addr, "gateway server listening");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server loop failed")
}
