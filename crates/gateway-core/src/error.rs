//! Gateway-wide error taxonomy (spec §7).
//!
//! Component boundaries never propagate vendor exception types; each
//! boundary returns one of these tagged variants or logs and cleans up
//! internally. The only things that cross to the device are canned voice
//! prompts and, in rare protocol-layer failures, a short text message
//! before close — `GatewayError` never serializes onto the wire itself.

use thiserror::Error;

/// Error taxonomy governing how `ConnectionHandler` reacts to a failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Bad/missing token, or device_id not recognized. Reject the
    /// connection with a short text response, then close.
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// Device unknown to the system; binding flow must run before any
    /// dialogue is accepted.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Device known but unbound; audio is dropped and bind prompts are
    /// played periodically.
    #[error("device bind required: {0}")]
    DeviceBindRequired(String),

    /// ASR/TTS/LLM/MCP socket hiccup. The offending session is closed and
    /// reset; surfaced to the user only if the turn cannot complete.
    #[error("upstream transient error in {component}: {message}")]
    UpstreamTransient { component: &'static str, message: String },

    /// Dispatch exception, timeout, or JSON parse failure in tool calling.
    #[error("tool error: {0}")]
    ToolError(String),

    /// Malformed audio header or bad JSON; the frame/message is discarded,
    /// the connection continues.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The device's daily output counter exceeded `device_max_output_size`.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    /// Unhandled exception at the top level. Logged with context; caller
    /// attempts a memory save and force-closes the socket.
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl GatewayError {
    #[must_use]
    pub const fn upstream(component: &'static str, message: String) -> Self {
        Self::UpstreamTransient { component, message }
    }
}
