#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings for planned test infrastructure
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use hyper as _;
#[cfg(test)]
use tokio_test as _;
#[cfg(test)]
use tower as _;

use gateway_llm as _; // Used by the gatewayd binary
use tracing_subscriber as _; // Used by the gatewayd binary

pub mod bootstrap;
pub mod connection;
pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use bootstrap::{bootstrap, start_server, BootstrapInputs};
pub use error::HttpError;
pub use routes::create_router;
pub use state::{AppState, BindPromptPlayer, ModuleFactory, RestartHook, SharedState};
