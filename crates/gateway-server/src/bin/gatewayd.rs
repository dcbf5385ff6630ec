//! Standalone entrypoint. Wires a real LLM adapter (`gateway-llm`'s
//! OpenAI-compatible client) and reads auth/network settings from the
//! environment; ASR/TTS/VAD stay vendor-agnostic ports (out of scope for
//! this crate), so this binary's `ModuleFactory` refuses to open those
//! sessions until an embedder links in real adapters and supplies their
//! own `ModuleFactory` via `gateway_server::bootstrap`.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use gateway_core::{AsrProvider, AsrProviderSession, GatewayConfig, LlmEngine, TtsProvider, TtsProviderSession, VadProvider, VoiceProviderError};
use gateway_llm::{OpenAiConfig, OpenAiEngine};
use gateway_server::{bootstrap, start_server, BootstrapInputs, ModuleFactory};

struct UnconfiguredVoiceAdapters;

impl VadProvider for UnconfiguredVoiceAdapters {
    fn is_speech(&self, _pcm_frame: &[i16]) -> bool {
        false
    }
}

#[async_trait]
impl AsrProvider for UnconfiguredVoiceAdapters {
    async fn open_session(&self) -> Result<Box<dyn AsrProviderSession>, VoiceProviderError> {
        Err(VoiceProviderError::ConnectFailed("no ASR adapter configured for this binary".to_string()))
    }
}

#[async_trait]
impl TtsProvider for UnconfiguredVoiceAdapters {
    async fn open_session(&self) -> Result<Box<dyn TtsProviderSession>, VoiceProviderError> {
        Err(VoiceProviderError::ConnectFailed("no TTS adapter configured for this binary".to_string()))
    }
}

struct DefaultModules {
    llm: Arc<OpenAiEngine>,
    unconfigured: Arc<UnconfiguredVoiceAdapters>,
}

impl ModuleFactory for DefaultModules {
    fn asr_provider(&self, _device_id: &str) -> Arc<dyn AsrProvider> {
        self.unconfigured.clone()
    }

    fn tts_provider(&self, _device_id: &str) -> Arc<dyn TtsProvider> {
        self.unconfigured.clone()
    }

    fn llm_engine(&self, _device_id: &str) -> Arc<dyn LlmEngine> {
        self.llm.clone()
    }

    fn vad_provider(&self, _device_id: &str) -> Arc<dyn VadProvider> {
        self.unconfigured.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut config = GatewayConfig::default();
    if let Ok(secret) = env::var("GATEWAY_AUTH_SECRET") {
        config.auth.secret_key = secret;
    } else {
        config.auth.enabled = false;
    }

    let llm = OpenAiEngine::new(OpenAiConfig::new(
        env::var("GATEWAY_LLM_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/v1".to_string()),
        env::var("GATEWAY_LLM_API_KEY").unwrap_or_default(),
        env::var("GATEWAY_LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
    ))?;

    let modules = Arc::new(DefaultModules {
        llm: Arc::new(llm),
        unconfigured: Arc::new(UnconfiguredVoiceAdapters),
    });

    let state = bootstrap(BootstrapInputs {
        config,
        modules,
        shared_vad: None,
        shared_local_asr: None,
        local_tools: Vec::new(),
        server_mcp_clients: Vec::new(),
        memory: None,
        emotion: None,
        bind_prompt: None,
        restart_hook: None,
        report_sink: None,
        admin_secret: env::var("GATEWAY_ADMIN_SECRET").ok(),
    });

    let port: u16 = env::var("GATEWAY_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8765);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    start_server(state, addr).await
}
