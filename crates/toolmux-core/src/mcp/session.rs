//! Seam between the connection manager and the protocol client

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::error::McpResult;
use crate::config::Settings;
use crate::types::{CallResult, ToolDescriptor, ServerDescriptor};

/// Concrete transport used for one connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Sse,
    SimpleHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::StreamableHttp => "streamable-http",
            TransportKind::Sse => "sse",
            TransportKind::SimpleHttp => "simple-http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An established, initialized session with one remote server
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// List every tool the server exposes
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>>;

    /// Invoke a tool; `Ok(None)` means the server answered with nothing
    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Option<CallResult>>;

    /// Close the session and release the transport
    async fn close(&self) -> McpResult<()>;
}

pub type SharedSession = Arc<dyn RemoteSession>;

/// Opens sessions over a specific transport
///
/// Implementations:
/// - `RmcpConnector`: rmcp for stdio, SSE and streamable HTTP; JSON-RPC POST for simple-http
/// - `MockConnector`: Deterministic in-process sessions for tests
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Open and initialize a session; failures are `TransportConnect` errors
    async fn connect(
        &self,
        kind: TransportKind,
        descriptor: &ServerDescriptor,
        settings: &Settings,
    ) -> McpResult<SharedSession>;
}
