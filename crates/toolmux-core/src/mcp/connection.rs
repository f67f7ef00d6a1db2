//! One managed connection to one MCP server

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use super::error::{McpError, McpResult};
use super::idle::IdleEvictionTimer;
use super::locker::Locker;
use super::session::{SessionConnector, SharedSession, TransportKind};
use super::transport::TransportNegotiator;
use crate::config::Settings;
use crate::logging::{PrefixedLogger, SharedLogger};
use crate::types::{CallResult, CancellationToken, ServerDescriptor, ServerEntry, ToolDescriptor};

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    /// A connect attempt holds the lock
    Connecting,
    Connected,
    Error,
}

/// Status reported in [`ServerInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Loading,
    Connected,
    Disconnected,
}

/// Snapshot of a connection for display
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub name: String,
    pub config: ServerEntry,
    pub status: ServerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tool_info: Vec<ToolDescriptor>,
}

#[derive(Default)]
struct ConnectionInner {
    state: Option<ConnectionState>,
    session: Option<SharedSession>,
    transport: Option<TransportKind>,
    tools: Vec<ToolDescriptor>,
    last_error: Option<McpError>,
}

/// Owns the session with one server
///
/// `connect` and `call_tool` never fail outward: connect failures become the
/// connection's error state, call failures become error envelopes.
pub struct McpConnection {
    descriptor: ServerDescriptor,
    connector: Arc<dyn SessionConnector>,
    settings: Settings,
    locker: Locker,
    idle: IdleEvictionTimer,
    inner: RwLock<ConnectionInner>,
    retired: AtomicBool,
    logger: SharedLogger,
    this: Weak<McpConnection>,
}

fn same_session(a: &SharedSession, b: &SharedSession) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl McpConnection {
    pub fn new(
        descriptor: ServerDescriptor,
        connector: Arc<dyn SessionConnector>,
        settings: Settings,
        logger: SharedLogger,
    ) -> Arc<Self> {
        let logger = PrefixedLogger::shared(format!("[McpConnection:{}]", descriptor.name()), logger);
        Arc::new_cyclic(|this| Self {
            descriptor,
            connector,
            settings,
            locker: Locker::new(),
            idle: IdleEvictionTimer::new(),
            inner: RwLock::new(ConnectionInner::default()),
            retired: AtomicBool::new(false),
            logger,
            this: this.clone(),
        })
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ConnectionState {
        if self.locker.is_locked() {
            return ConnectionState::Connecting;
        }
        self.inner.read().state.unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.read().state == Some(ConnectionState::Connected)
    }

    /// Error from the last failed connect or hard remote failure
    ///
    /// Survives `disconnect()`; only a successful connect clears it.
    pub fn last_error(&self) -> Option<McpError> {
        self.inner.read().last_error.clone()
    }

    /// Whether the manager has dropped this connection for good
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Transport used by the current session
    pub fn transport(&self) -> Option<TransportKind> {
        self.inner.read().transport
    }

    /// Tools discovered at the last successful connect
    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.inner.read().tools.clone()
    }

    fn session(&self) -> Option<SharedSession> {
        let inner = self.inner.read();
        match inner.state {
            Some(ConnectionState::Connected) => inner.session.clone(),
            _ => None,
        }
    }

    /// Connect if not already connected
    ///
    /// Concurrent callers share one handshake: whoever finds the lock held
    /// waits for it and gets the resulting session.
    pub async fn connect(&self) -> Option<SharedSession> {
        if self.is_retired() {
            return None;
        }
        if self.locker.is_locked() {
            self.locker.wait().await;
            return self.session();
        }
        if let Some(session) = self.session() {
            return Some(session);
        }

        let Some(_guard) = self.locker.try_guard() else {
            self.locker.wait().await;
            return self.session();
        };
        // `retire` may have run its disconnect between the checks above and the guard.
        if self.is_retired() {
            return None;
        }

        let started_at = Instant::now();
        match self.open().await {
            Ok((kind, session, tools)) => {
                {
                    let mut inner = self.inner.write();
                    inner.state = Some(ConnectionState::Connected);
                    inner.last_error = None;
                    inner.session = Some(session.clone());
                    inner.transport = Some(kind);
                    inner.tools = tools;
                }
                log_info!(
                    self.logger,
                    "Connected to MCP server via {} in {:.2}s",
                    kind,
                    started_at.elapsed().as_secs_f64()
                );
                self.schedule_idle();
                Some(session)
            }
            Err(err) => {
                log_error!(self.logger, "Failed to connect: {}", err);
                let mut inner = self.inner.write();
                inner.state = Some(ConnectionState::Error);
                inner.last_error = Some(err);
                inner.session = None;
                inner.transport = None;
                inner.tools.clear();
                None
            }
        }
    }

    async fn open(&self) -> McpResult<(TransportKind, SharedSession, Vec<ToolDescriptor>)> {
        let (kind, session) = TransportNegotiator::negotiate(
            self.connector.as_ref(),
            &self.descriptor,
            &self.settings,
            self.logger.as_ref(),
        )
        .await?;

        match session.list_tools().await {
            Ok(tools) => Ok((kind, session, tools)),
            Err(err) => {
                if let Err(close_err) = session.close().await {
                    log_debug!(self.logger, "Close after failed tool listing: {}", close_err);
                }
                Err(err)
            }
        }
    }

    /// Close the session, waiting for any in-flight connect first
    pub async fn disconnect(&self) {
        log_info!(self.logger, "Disconnecting from MCP server");
        self.locker.wait().await;
        self.idle.cancel();

        let session = {
            let mut inner = self.inner.write();
            inner.state = Some(ConnectionState::Disconnected);
            inner.transport = None;
            inner.tools.clear();
            inner.session.take()
        };

        if let Some(session) = session {
            if let Err(err) = session.close().await {
                log_error!(self.logger, "Failed to close session: {}", err);
            }
        }
    }

    /// Disconnect permanently
    ///
    /// Later `connect` calls return `None` and `call_tool` reports the server
    /// as not found, so holders of a stale `Arc` cannot open a new session.
    pub async fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
        self.disconnect().await;
    }

    /// Disconnect and connect again; the way out of the error state
    pub async fn refresh(&self) -> Option<SharedSession> {
        self.disconnect().await;
        self.connect().await
    }

    /// Invoke a tool on this server
    ///
    /// Always returns a result: failures use the `{error:{message,name}}`
    /// envelope. Cancelling `cancel` abandons the call without touching the
    /// connection.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> CallResult {
        log_info!(self.logger, "tool call {}", tool_name);

        match self.try_call_tool(tool_name, arguments, cancel).await {
            Ok(result) => {
                if result.is_error {
                    log_error!(self.logger, "Tool call failed {}: {}", tool_name, result.text());
                }
                result
            }
            Err(err) => {
                log_error!(self.logger, "Tool call failed {}: {}", tool_name, err);
                CallResult::from(&err)
            }
        }
    }

    async fn try_call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> McpResult<CallResult> {
        if self.is_retired() {
            return Err(McpError::ServerNotFound(self.name().to_string()));
        }
        if self.inner.read().last_error.is_some() {
            return Err(McpError::ErrorState);
        }
        if cancel.is_cancelled() {
            return Err(McpError::Cancelled);
        }
        self.schedule_idle();

        let session = match self.connect().await {
            Some(session) => session,
            None if self.is_retired() => {
                return Err(McpError::ServerNotFound(self.name().to_string()))
            }
            None => {
                return Err(self
                    .last_error()
                    .unwrap_or_else(|| McpError::NotConnected(self.name().to_string())))
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            outcome = session.call_tool(tool_name, arguments) => outcome,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                if err.is_hard() {
                    self.mark_broken(&session, err.clone()).await;
                }
                return Err(err);
            }
        };

        let result = result.ok_or(McpError::NullResult)?;
        self.schedule_idle();
        Ok(result)
    }

    /// The transport died under `session`: drop it and enter the error state
    async fn mark_broken(&self, session: &SharedSession, err: McpError) {
        let broken = {
            let mut inner = self.inner.write();
            match &inner.session {
                Some(current) if same_session(current, session) => {
                    inner.state = Some(ConnectionState::Error);
                    inner.last_error = Some(err);
                    inner.transport = None;
                    inner.tools.clear();
                    inner.session.take()
                }
                _ => None,
            }
        };

        if let Some(session) = broken {
            log_warn!(self.logger, "Session lost, entering error state");
            self.idle.cancel();
            if let Err(close_err) = session.close().await {
                log_debug!(self.logger, "Close after transport loss: {}", close_err);
            }
        }
    }

    fn schedule_idle(&self) {
        let Some(timeout) = self.settings.idle_timeout else {
            return;
        };
        if self.is_retired() {
            return;
        }

        let this = self.this.clone();
        self.idle.reset(timeout, async move {
            if let Some(connection) = this.upgrade() {
                log_info!(connection.logger, "Idle timeout reached");
                connection.disconnect().await;
            }
        });
    }

    /// Snapshot for display
    pub fn info(&self) -> ServerInfo {
        let loading = self.locker.is_locked();
        let inner = self.inner.read();
        let status = if loading {
            ServerStatus::Loading
        } else if inner.state == Some(ConnectionState::Connected) {
            ServerStatus::Connected
        } else {
            ServerStatus::Disconnected
        };

        ServerInfo {
            name: self.name().to_string(),
            config: self.descriptor.to_entry(),
            status,
            error: inner.last_error.as_ref().map(ToString::to_string),
            tool_info: inner.tools.clone(),
        }
    }
}

impl std::fmt::Debug for McpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpConnection")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}
