//! Device WebSocket JSON protocol (spec §6): inbound `type`-tagged text
//! messages and the server's `tts`/`stt`/`server` responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Hello(HelloMessage),
    Abort(AbortMessage),
    Listen(ListenMessage),
    Iot(IotMessage),
    Mcp(McpMessage),
    Server(ServerControlMessage),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HelloMessage {
    #[serde(default)]
    pub audio_params: Option<AudioParams>,
    #[serde(default)]
    pub features: Option<Features>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioParams {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub mcp: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbortMessage {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListenMessage {
    /// `"start"` | `"stop"` | `"detect"`.
    #[serde(default)]
    pub state: Option<String>,
    /// `"auto"` | `"manual"` — mirrors `ListenMode` (spec §4.3).
    #[serde(default)]
    pub mode: Option<String>,
    /// Present on `state:"detect"` text-only turns (no ASR round-trip).
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IotMessage {
    #[serde(default)]
    pub descriptors: Option<Value>,
    #[serde(default)]
    pub states: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpMessage {
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerControlMessage {
    pub secret: String,
    /// `"update_config"` | `"restart"`.
    pub action: String,
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Hello {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio_params: Option<AudioParams>,
    },
    Tts {
        state: TtsState,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Stt {
        text: String,
    },
    Server {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Mcp {
        payload: Value,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    Stop,
}
