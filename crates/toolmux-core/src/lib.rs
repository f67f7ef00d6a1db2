//! Toolmux Core
//!
//! Runtime-agnostic MCP (Model Context Protocol) connection manager and
//! tool-invocation proxy. It keeps one connection per configured server in
//! line with a configuration store, and exposes every connected server's
//! tools as a single catalogue that an LLM orchestration layer can call.
//!
//! ## Tool Invocation
//!
//! ```rust,ignore
//! use toolmux_core::{McpRuntime, FileConfigStore, Settings, ConsoleLogger, CancellationToken};
//! use std::sync::Arc;
//!
//! let runtime = McpRuntime::new(
//!     Arc::new(FileConfigStore::user()),
//!     Settings::from_env(),
//!     Arc::new(ConsoleLogger::new()),
//! );
//!
//! let manager = runtime.get().await?;
//! let tools = manager.tools().await;
//!
//! // Execute a tool call from an LLM response
//! let cancel = CancellationToken::new();
//! let result = tools["github_search"]
//!     .execute(json!({ "query": "rmcp" }), &cancel)
//!     .await;
//! ```

#[macro_use]
pub mod logging;
pub mod config;
pub mod mcp;
pub mod runtime;
pub mod tools;
pub mod types;

// Re-export commonly used types
pub use types::{
    CallResult, CancellationToken, HttpConfig, Protocol, ServerDescriptor, ServerEntry, ServerSet,
    ServerTransport, StdioConfig, ToolDescriptor,
};

pub use logging::{ConsoleLogger, Logger, MemoryLogger, NoOpLogger, PrefixedLogger, SharedLogger};

pub use config::{
    ConfigError, ConfigLevel, ConfigResult, ConfigStore, FileConfigStore, LayeredConfigStore,
    MemoryConfigStore, Settings,
};

pub use mcp::{
    ConnectionState, McpConnection, McpError, McpManager, McpResult, MockConnector, RmcpConnector,
    ServerInfo, ServerStatus, TransportKind,
};

pub use runtime::McpRuntime;

pub use tools::{filter_by_allowed_servers, filter_by_mentions, Mention, NormalizedToolHandle, ToolFilter};
