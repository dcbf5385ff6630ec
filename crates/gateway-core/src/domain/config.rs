//! Typed configuration tree for the gateway.
//!
//! File and remote-admin-API loading are out of scope; callers construct a
//! [`GatewayConfig`] programmatically (or via `serde::Deserialize` against
//! whatever config source they have) and hand it to the composition root.

use serde::{Deserialize, Serialize};

/// How `AudioFrameRouter`'s reorder buffer behaves when a new frame would
/// overflow its bounded window.
///
/// The original implementation always delivered the incoming frame
/// immediately on overflow, favoring liveness over strict order; whether
/// that was intentional is unclear, so it is exposed as a choice here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    #[default]
    DeliverImmediately,
    DropNewest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub secret_key: String,
    pub expire_seconds: i64,
    pub allow_list: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            secret_key: String::new(),
            expire_seconds: 60 * 60 * 24 * 30,
            allow_list: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioRouterConfig {
    pub reorder_buffer_cap: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for AudioRouterConfig {
    fn default() -> Self {
        Self {
            reorder_buffer_cap: 20,
            overflow_policy: OverflowPolicy::DeliverImmediately,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub hysteresis_window: usize,
    pub wake_suppression_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            hysteresis_window: 5,
            wake_suppression_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub replay_cache_frames: usize,
    pub last_hypothesis_timeout_ms: u64,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            replay_cache_frames: 10,
            last_hypothesis_timeout_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PacedSenderConfig {
    pub frame_duration_ms: u64,
    pub pre_buffer_frames: usize,
    /// `0` selects rate-controlled mode; a positive value selects fixed-delay mode.
    pub tts_audio_send_delay_ms: u64,
}

impl Default for PacedSenderConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: 60,
            pre_buffer_frames: 5,
            tts_audio_send_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub tool_call_timeout_secs: u64,
    pub server_mcp_max_retries: u32,
    pub server_mcp_retry_backoff_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            tool_call_timeout_secs: 30,
            server_mcp_max_retries: 3,
            server_mcp_retry_backoff_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnEngineConfig {
    pub max_depth: u32,
}

impl Default for TurnEngineConfig {
    fn default() -> Self {
        Self { max_depth: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndPromptConfig {
    pub enable: bool,
    pub message: String,
}

impl Default for EndPromptConfig {
    fn default() -> Self {
        Self {
            enable: false,
            message: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub close_connection_no_voice_time_secs: u64,
    pub bind_prompt_interval_secs: u64,
    pub device_max_output_size: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            close_connection_no_voice_time_secs: 120,
            bind_prompt_interval_secs: 60,
            device_max_output_size: 0,
        }
    }
}

/// The full, process-wide gateway configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub auth: AuthConfig,
    pub audio_router: AudioRouterConfig,
    pub vad: VadConfig,
    pub asr: AsrConfig,
    pub paced_sender: PacedSenderConfig,
    pub mcp: McpConfig,
    pub turn_engine: TurnEngineConfig,
    pub end_prompt: EndPromptConfig,
    pub connection: ConnectionConfig,
}
