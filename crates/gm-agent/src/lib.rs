//! GcpMon agent: library crate behind the `gm-agent` binary.
//!
//! Exposes the typed tool surface (`ToolCall` / `ToolOutput`), the
//! `Dispatcher` that routes calls to executors through the resource
//! catalog, the name-keyed `ToolRegistry` used at the agent boundary, the
//! concurrent `BatchRunner`, and configuration loading. `gm-e2e-tests`
//! drives everything through these re-exports.

pub mod batch;
pub mod config;
pub mod dispatch;
pub mod registry;

pub use batch::{BatchError, BatchMode, BatchRunner};
pub use config::{AgentConfig, BackendKind, ConfigError};
pub use dispatch::{Dispatcher, ToolCall, ToolOutput};
pub use registry::{ToolInfo, ToolRegistry};
