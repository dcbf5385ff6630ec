#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod device_mcp;
pub mod error;
pub mod http_client;
pub mod path;
pub mod registry;
pub mod server_mcp;
pub mod stdio_client;
pub mod types;

pub use device_mcp::{DeviceMcpClient, DeviceTransport};
pub use error::McpError;
pub use http_client::{HttpClient, HttpConfig};
pub use registry::{LocalFunction, ToolRegistry};
pub use server_mcp::{sanitize_tool_name, ServerMcpClient, ServerTransportConfig};
pub use stdio_client::{StdioClient, StdioConfig};
pub use types::{ContentItem, McpTool, ToolCallOutcome, ToolsListPage};
