//! Mock connector for testing
//!
//! Provides deterministic, configurable sessions without spawning processes
//! or opening sockets. Each server name gets its own behavior and counters.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};

use super::error::{McpError, McpResult};
use super::session::{RemoteSession, SessionConnector, SharedSession, TransportKind};
use crate::config::Settings;
use crate::types::{CallResult, ServerDescriptor, ToolDescriptor};

/// How a mock session answers tool calls
#[derive(Debug, Clone, Default)]
pub enum MockCallMode {
    /// Return the arguments as JSON text
    #[default]
    Echo,
    /// Return a fixed text result
    Fixed(String),
    /// Return a tool-level error result (`isError: true`)
    ToolError(String),
    /// Answer with nothing
    Null,
    /// Fail with a protocol error
    Fail(String),
    /// Act as if the transport died underneath the session
    TransportClosed,
}

/// Behavior of one mock server
#[derive(Debug, Clone)]
pub struct MockServerBehavior {
    /// Tools reported by `list_tools`
    pub tools: Vec<ToolDescriptor>,
    /// Transports that refuse to connect
    pub failing_transports: HashSet<TransportKind>,
    /// Tool call behavior
    pub call_mode: MockCallMode,
    /// Delay before a handshake completes
    pub connect_delay: Duration,
    /// Delay before a tool call completes
    pub call_delay: Duration,
    /// Make `close` return an error
    pub fail_close: bool,
}

impl Default for MockServerBehavior {
    fn default() -> Self {
        Self {
            tools: vec![ToolDescriptor::new("echo").with_description("Echo the arguments back")],
            failing_transports: HashSet::new(),
            call_mode: MockCallMode::Echo,
            connect_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            fail_close: false,
        }
    }
}

impl MockServerBehavior {
    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    /// Shorthand for tools with default schemas
    pub fn with_tool_names(self, names: &[&str]) -> Self {
        self.with_tools(names.iter().map(|n| ToolDescriptor::new(*n)).collect())
    }

    pub fn failing(mut self, kind: TransportKind) -> Self {
        self.failing_transports.insert(kind);
        self
    }

    /// Refuse every transport
    pub fn unreachable(mut self) -> Self {
        self.failing_transports.extend([
            TransportKind::Stdio,
            TransportKind::StreamableHttp,
            TransportKind::Sse,
            TransportKind::SimpleHttp,
        ]);
        self
    }

    pub fn with_call_mode(mut self, mode: MockCallMode) -> Self {
        self.call_mode = mode;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }
}

#[derive(Debug, Default)]
struct MockStats {
    attempts: Mutex<Vec<TransportKind>>,
    handshakes: AtomicUsize,
    closes: AtomicUsize,
    calls: AtomicUsize,
    open_sessions: AtomicUsize,
}

/// Mock connector for testing
#[derive(Debug, Default)]
pub struct MockConnector {
    servers: RwLock<HashMap<String, MockServerBehavior>>,
    stats: Mutex<HashMap<String, Arc<MockStats>>>,
}

impl MockConnector {
    /// Create a connector where every server uses the default behavior
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behavior of one server
    pub fn with_server(self, name: impl Into<String>, behavior: MockServerBehavior) -> Self {
        self.set_server(name, behavior);
        self
    }

    /// Change the behavior of one server; applies to the next handshake
    pub fn set_server(&self, name: impl Into<String>, behavior: MockServerBehavior) {
        self.servers.write().insert(name.into(), behavior);
    }

    fn behavior(&self, name: &str) -> MockServerBehavior {
        self.servers.read().get(name).cloned().unwrap_or_default()
    }

    fn stats(&self, name: &str) -> Arc<MockStats> {
        self.stats
            .lock()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Transports attempted for a server, in order
    pub fn attempts(&self, name: &str) -> Vec<TransportKind> {
        self.stats(name).attempts.lock().clone()
    }

    /// Successful handshakes for a server
    pub fn handshakes(&self, name: &str) -> usize {
        self.stats(name).handshakes.load(Ordering::SeqCst)
    }

    /// Session closes for a server
    pub fn closes(&self, name: &str) -> usize {
        self.stats(name).closes.load(Ordering::SeqCst)
    }

    /// Tool calls that reached a server
    pub fn calls(&self, name: &str) -> usize {
        self.stats(name).calls.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet closed
    pub fn open_sessions(&self, name: &str) -> usize {
        self.stats(name).open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn connect(
        &self,
        kind: TransportKind,
        descriptor: &ServerDescriptor,
        _settings: &Settings,
    ) -> McpResult<SharedSession> {
        let behavior = self.behavior(descriptor.name());
        let stats = self.stats(descriptor.name());
        stats.attempts.lock().push(kind);

        if !behavior.connect_delay.is_zero() {
            tokio::time::sleep(behavior.connect_delay).await;
        }

        if behavior.failing_transports.contains(&kind) {
            return Err(McpError::transport_connect(
                kind.as_str(),
                format!("mock {} transport refused", kind),
            ));
        }

        stats.handshakes.fetch_add(1, Ordering::SeqCst);
        stats.open_sessions.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(MockSession {
            behavior,
            stats,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session handed out by [`MockConnector`]
#[derive(Debug)]
pub struct MockSession {
    behavior: MockServerBehavior,
    stats: Arc<MockStats>,
    closed: AtomicBool,
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed("session closed".to_string()));
        }
        Ok(self.behavior.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Option<CallResult>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(McpError::TransportClosed("session closed".to_string()));
        }
        self.stats.calls.fetch_add(1, Ordering::SeqCst);

        if !self.behavior.call_delay.is_zero() {
            tokio::time::sleep(self.behavior.call_delay).await;
        }

        if !self.behavior.tools.iter().any(|t| t.name == name) {
            return Err(McpError::RemoteProtocol(format!("tool not found: {}", name)));
        }

        match &self.behavior.call_mode {
            MockCallMode::Echo => Ok(Some(CallResult {
                content: vec![json!({ "type": "text", "text": arguments.to_string() })],
                structured_content: Some(arguments),
                is_error: false,
            })),
            MockCallMode::Fixed(text) => Ok(Some(CallResult::text_result(text.clone()))),
            MockCallMode::ToolError(text) => Ok(Some(CallResult {
                is_error: true,
                ..CallResult::text_result(text.clone())
            })),
            MockCallMode::Null => Ok(None),
            MockCallMode::Fail(message) => Err(McpError::RemoteProtocol(message.clone())),
            MockCallMode::TransportClosed => {
                Err(McpError::TransportClosed("connection reset by peer".to_string()))
            }
        }
    }

    async fn close(&self) -> McpResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            self.stats.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        if self.behavior.fail_close {
            return Err(McpError::RemoteProtocol("mock close failed".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ServerDescriptor {
        ServerDescriptor::sse("weather", "https://weather.example.com/sse").unwrap()
    }

    #[tokio::test]
    async fn test_echo_session() {
        let connector = MockConnector::new();
        let session = connector
            .connect(TransportKind::Sse, &descriptor(), &Settings::default())
            .await
            .unwrap();

        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools[0].name, "echo");

        let result = session
            .call_tool("echo", json!({ "city": "Paris" }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.structured_content, Some(json!({ "city": "Paris" })));
        assert_eq!(connector.calls("weather"), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_protocol_error() {
        let connector = MockConnector::new();
        let session = connector
            .connect(TransportKind::Sse, &descriptor(), &Settings::default())
            .await
            .unwrap();

        let err = session.call_tool("nope", json!({})).await.unwrap_err();
        assert_eq!(err.name(), "RemoteProtocolError");
    }

    #[tokio::test]
    async fn test_close_is_counted_once() {
        let connector = MockConnector::new();
        let session = connector
            .connect(TransportKind::Sse, &descriptor(), &Settings::default())
            .await
            .unwrap();
        assert_eq!(connector.open_sessions("weather"), 1);

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(connector.closes("weather"), 1);
        assert_eq!(connector.open_sessions("weather"), 0);

        assert!(session.call_tool("echo", json!({})).await.unwrap_err().is_hard());
    }
}
