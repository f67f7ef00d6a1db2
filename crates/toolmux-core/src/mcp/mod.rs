//! MCP (Model Context Protocol) connection management
//!
//! One [`McpConnection`] per configured server, owned by an [`McpManager`]
//! that keeps the live set in line with the configuration store.
//!
//! Sessions are opened through a [`SessionConnector`]. [`RmcpConnector`]
//! speaks stdio, streamable HTTP, SSE and simple HTTP using the official rmcp
//! SDK and reqwest; [`MockConnector`] stands in for remote servers in tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use toolmux_core::mcp::{McpManager, RmcpConnector};
//! use toolmux_core::{MemoryConfigStore, ServerDescriptor, Settings, CancellationToken};
//! use std::sync::Arc;
//!
//! let store = MemoryConfigStore::from_descriptors([
//!     ServerDescriptor::stdio("fs", "npx", ["@modelcontextprotocol/server-filesystem", "/tmp"])?,
//! ]);
//! let manager = McpManager::new(
//!     Arc::new(store),
//!     Arc::new(RmcpConnector::new()),
//!     Settings::from_env(),
//!     logger,
//! );
//! manager.init().await?;
//!
//! let result = manager
//!     .call_tool("fs", "read_file", json!({ "path": "/tmp/notes.txt" }), &CancellationToken::never())
//!     .await;
//! ```

mod connection;
mod error;
mod idle;
mod locker;
mod manager;
pub mod mock;
mod rmcp_session;
mod session;
mod simple_http;
mod transport;

pub use connection::{ConnectionState, McpConnection, ServerInfo, ServerStatus};
pub use error::{McpError, McpResult};
pub use idle::IdleEvictionTimer;
pub use locker::{LockGuard, Locker};
pub use manager::{ConnectionMap, McpManager};
pub use mock::{MockCallMode, MockConnector, MockServerBehavior};
pub use rmcp_session::{RmcpConnector, RmcpSession};
pub use session::{RemoteSession, SessionConnector, SharedSession, TransportKind};
pub use simple_http::SimpleHttpSession;
pub use transport::TransportNegotiator;
