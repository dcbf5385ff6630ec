//! Shared test scaffolding: a `ModuleFactory` whose providers error if
//! actually opened. Handshake/auth tests never drive real audio, so this
//! is enough to exercise `bootstrap`/`start_server` end-to-end.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::stream::BoxStream;
use gateway_core::{
    AsrProvider, AsrProviderSession, GatewayConfig, LlmEngine, LlmError, Message, SamplingParams,
    StreamItem, ToolDefinition, TtsProvider, TtsProviderSession, VadProvider, VoiceProviderError,
};
use gateway_server::{bootstrap, BootstrapInputs, ModuleFactory, SharedState};
use tokio::net::TcpListener;

pub struct NeverUsedModules;

impl VadProvider for NeverUsedModules {
    fn is_speech(&self, _pcm_frame: &[i16]) -> bool {
        false
    }
}

#[async_trait]
impl AsrProvider for NeverUsedModules {
    async fn open_session(&self) -> Result<Box<dyn AsrProviderSession>, VoiceProviderError> {
        Err(VoiceProviderError::ConnectFailed("not configured in tests".into()))
    }
}

#[async_trait]
impl TtsProvider for NeverUsedModules {
    async fn open_session(&self) -> Result<Box<dyn TtsProviderSession>, VoiceProviderError> {
        Err(VoiceProviderError::ConnectFailed("not configured in tests".into()))
    }
}

#[async_trait]
impl LlmEngine for NeverUsedModules {
    async fn stream(&self, _dialogue: &[Message], _params: &SamplingParams) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        Err(LlmError::Transport("not configured in tests".into()))
    }

    async fn stream_with_tools(
        &self,
        _dialogue: &[Message],
        _tools: &[ToolDefinition],
        _params: &SamplingParams,
    ) -> Result<BoxStream<'static, Result<StreamItem, LlmError>>, LlmError> {
        Err(LlmError::Transport("not configured in tests".into()))
    }
}

impl ModuleFactory for NeverUsedModules {
    fn asr_provider(&self, _device_id: &str) -> Arc<dyn AsrProvider> {
        Arc::new(Self)
    }
    fn tts_provider(&self, _device_id: &str) -> Arc<dyn TtsProvider> {
        Arc::new(Self)
    }
    fn llm_engine(&self, _device_id: &str) -> Arc<dyn LlmEngine> {
        Arc::new(Self)
    }
    fn vad_provider(&self, _device_id: &str) -> Arc<dyn VadProvider> {
        Arc::new(Self)
    }
}

/// Spins up a real server on an ephemeral port and returns its address.
/// `configure` lets each test tweak auth/connection settings before boot.
pub async fn spawn_server(configure: impl FnOnce(&mut GatewayConfig)) -> SocketAddr {
    let mut config = GatewayConfig::default();
    configure(&mut config);

    let state: SharedState = bootstrap(BootstrapInputs {
        config,
        modules: Arc::new(NeverUsedModules),
        shared_vad: None,
        shared_local_asr: None,
        local_tools: Vec::new(),
        server_mcp_clients: Vec::new(),
        memory: None,
        emotion: None,
        bind_prompt: None,
        restart_hook: None,
        report_sink: None,
        admin_secret: Some("test-admin-secret".to_string()),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let router = gateway_server::create_router(state);

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("test server crashed");
    });

    addr
}
