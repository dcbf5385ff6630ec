//! Shared application state type and the injection seams for concrete
//! vendor adapters.
//!
//! Concrete ASR/TTS/LLM/VAD vendor adapters are out of scope for this
//! crate (spec §1) — only their port contracts (`gateway_core::ports`) are
//! specified. [`ModuleFactory`] is the composition-root seam an embedder
//! implements to supply them; [`bootstrap::bootstrap`] wires everything
//! else (tool registry, auth, turn engine config) around it.

use std::sync::Arc;

use async_trait::async_trait;

use gateway_core::{
    AsrProvider, AuthVerifier, EmotionHook, GatewayConfig, LlmEngine, MemoryStore, TtsProvider,
    VadProvider,
};
use gateway_mcp::{LocalFunction, ServerMcpClient};

/// Per-device vendor adapter construction, injected by the embedder.
///
/// `device_id` lets an implementation pick per-device credentials/config
/// (a private per-device voice or model, say). Implementations that are
/// happy with one global provider can ignore the argument.
pub trait ModuleFactory: Send + Sync {
    fn asr_provider(&self, device_id: &str) -> Arc<dyn AsrProvider>;
    fn tts_provider(&self, device_id: &str) -> Arc<dyn TtsProvider>;
    fn llm_engine(&self, device_id: &str) -> Arc<dyn LlmEngine>;
    fn vad_provider(&self, device_id: &str) -> Arc<dyn VadProvider>;
}

/// Plays the bind-code voice prompt while a connection has `need_bind` set.
/// A no-op when absent: the canned audio assets themselves (spec §6) are
/// outside this crate's scope, only the periodic-replay behavior is.
#[async_trait]
pub trait BindPromptPlayer: Send + Sync {
    async fn play_bind_code(&self, bind_code: Option<&str>);
}

/// Fired when a `type=server` `restart` control message is accepted.
/// Replacing the process is environment-specific; a no-op implementation
/// just lets the connection close.
#[async_trait]
pub trait RestartHook: Send + Sync {
    async fn restart(&self);
}

/// One round-trip timing sample from a connection's voice pipeline.
/// Mirrors the original implementation's report-worker events
/// (ASR/TTS timings handed off to a background thread) without inventing a
/// concrete metrics backend.
#[derive(Debug, Clone)]
pub enum ReportEvent {
    Asr { device_id: String, duration_ms: u64 },
    Tts { device_id: String, duration_ms: u64 },
}

/// Receives report events drained off each connection's background report
/// task. Dropped silently when absent — this is an observability seam, not
/// a required dependency.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn record(&self, event: ReportEvent);
}

/// Process-wide services shared across every connection.
pub struct AppState {
    pub config: GatewayConfig,
    pub auth: AuthVerifier,
    pub modules: Arc<dyn ModuleFactory>,

    /// Set only when the embedder's VAD model is cheap to share across
    /// connections; `None` means each connection gets its own via
    /// `ModuleFactory::vad_provider`.
    pub shared_vad: Option<Arc<dyn VadProvider>>,
    /// Set only when the ASR provider's interface is `LOCAL` (in-process,
    /// no per-connection socket); remote ASR is always per-connection
    /// (spec §4.12) and is obtained from `ModuleFactory::asr_provider`.
    pub shared_local_asr: Option<Arc<dyn AsrProvider>>,

    pub local_tools: Vec<Arc<dyn LocalFunction>>,
    pub server_mcp_clients: Vec<Arc<ServerMcpClient>>,

    pub memory: Option<Arc<dyn MemoryStore>>,
    pub emotion: Option<Arc<dyn EmotionHook>>,
    pub bind_prompt: Option<Arc<dyn BindPromptPlayer>>,
    pub restart_hook: Option<Arc<dyn RestartHook>>,
    pub report_sink: Option<Arc<dyn ReportSink>>,

    /// Shared secret compared (constant-time) against `type=server`
    /// control messages; `None` disables the control channel entirely.
    pub admin_secret: Option<String>,
}

/// Shared application state handle, as used by every handler.
pub type SharedState = Arc<AppState>;

pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
