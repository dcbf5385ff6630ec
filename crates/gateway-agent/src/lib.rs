#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod error;
pub mod text_tool_call;
pub mod tool_call_merge;
pub mod turn_engine;

pub use error::TurnEngineError;
pub use text_tool_call::extract_json_object;
pub use tool_call_merge::{merge_tool_call_delta, PendingToolCall};
pub use turn_engine::{TurnEngine, TurnEngineDeps};
