//! Production connector built on the rmcp SDK
//!
//! stdio, SSE and streamable HTTP go through rmcp; simple-http is plain
//! JSON-RPC over POST (see `simple_http`).

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, Tool},
    service::{Peer, RunningService, ServiceError},
    transport::{
        sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig,
        ConfigureCommandExt, SseClientTransport, StreamableHttpClientTransport, TokioChildProcess,
    },
    RoleClient, ServiceExt,
};
use serde_json::Value;
use tokio::process::Command;

use super::error::{McpError, McpResult};
use super::session::{RemoteSession, SessionConnector, SharedSession, TransportKind};
use super::simple_http::SimpleHttpSession;
use crate::config::Settings;
use crate::types::{CallResult, HttpConfig, ServerDescriptor, ServerTransport, StdioConfig, ToolDescriptor};

type ClientService = RunningService<RoleClient, ()>;

/// Opens real sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    pub fn new() -> Self {
        Self
    }

    async fn connect_stdio(stdio: &StdioConfig) -> McpResult<ClientService> {
        let cwd = match stdio.cwd() {
            Some(cwd) => cwd.to_path_buf(),
            None => std::env::current_dir().map_err(|e| McpError::transport_connect("stdio", e))?,
        };
        let env = stdio.merged_env();

        let transport = TokioChildProcess::new(Command::new(stdio.command()).configure(|cmd| {
            cmd.args(stdio.args())
                .env_clear()
                .envs(&env)
                .current_dir(&cwd)
                .stderr(Stdio::inherit());
        }))
        .map_err(|e| {
            McpError::transport_connect("stdio", format!("spawn '{}': {}", stdio.command(), e))
        })?;

        ().serve(transport)
            .await
            .map_err(|e| McpError::transport_connect("stdio", format!("initialize: {}", e)))
    }

    async fn connect_streamable_http(
        http: &HttpConfig,
        settings: &Settings,
    ) -> McpResult<ClientService> {
        let client = http_client(TransportKind::StreamableHttp, http, settings)?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(http.url()),
        );

        ().serve(transport).await.map_err(|e| {
            McpError::transport_connect("streamable-http", format!("initialize: {}", e))
        })
    }

    async fn connect_sse(http: &HttpConfig, settings: &Settings) -> McpResult<ClientService> {
        let client = http_client(TransportKind::Sse, http, settings)?;
        let config = SseClientConfig {
            sse_endpoint: http.url().to_string().into(),
            ..Default::default()
        };

        let transport = SseClientTransport::start_with_client(client, config)
            .await
            .map_err(|e| McpError::transport_connect("sse", e))?;

        ().serve(transport)
            .await
            .map_err(|e| McpError::transport_connect("sse", format!("initialize: {}", e)))
    }
}

fn mismatch(kind: TransportKind, descriptor: &ServerDescriptor) -> McpError {
    McpError::UnsupportedTransport(format!(
        "{} for a {} server",
        kind,
        descriptor.protocol()
    ))
}

/// HTTP client carrying the server's headers on every request
pub(crate) fn http_client(
    kind: TransportKind,
    http: &HttpConfig,
    settings: &Settings,
) -> McpResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    for (name, value) in http.headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| McpError::transport_connect(kind.as_str(), e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| McpError::transport_connect(kind.as_str(), format!("header {}: {}", name, e)))?;
        headers.insert(name, value);
    }

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = settings.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| McpError::transport_connect(kind.as_str(), e))
}

#[async_trait]
impl SessionConnector for RmcpConnector {
    async fn connect(
        &self,
        kind: TransportKind,
        descriptor: &ServerDescriptor,
        settings: &Settings,
    ) -> McpResult<SharedSession> {
        let transport = descriptor.transport();
        let service = match (kind, transport) {
            (TransportKind::Stdio, ServerTransport::Stdio(stdio)) => {
                Self::connect_stdio(stdio).await?
            }
            (TransportKind::StreamableHttp, _) => {
                let http = transport.http().ok_or_else(|| mismatch(kind, descriptor))?;
                Self::connect_streamable_http(http, settings).await?
            }
            (TransportKind::Sse, _) => {
                let http = transport.http().ok_or_else(|| mismatch(kind, descriptor))?;
                Self::connect_sse(http, settings).await?
            }
            (TransportKind::SimpleHttp, ServerTransport::SimpleHttp(http)) => {
                let session = SimpleHttpSession::connect(http, settings).await?;
                return Ok(Arc::new(session));
            }
            _ => return Err(mismatch(kind, descriptor)),
        };

        Ok(Arc::new(RmcpSession::new(service)))
    }
}

/// Session backed by an rmcp client service
pub struct RmcpSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<ClientService>>,
}

impl RmcpSession {
    fn new(service: ClientService) -> Self {
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

fn remote_error(err: ServiceError) -> McpError {
    match err {
        ServiceError::TransportClosed => McpError::TransportClosed("transport closed".to_string()),
        err @ ServiceError::TransportSend(_) => McpError::TransportClosed(err.to_string()),
        other => McpError::RemoteProtocol(other.to_string()),
    }
}

fn arguments_object(arguments: Value) -> McpResult<Option<serde_json::Map<String, Value>>> {
    match arguments {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(McpError::RemoteProtocol(format!(
            "tool arguments must be a JSON object, got {}",
            other
        ))),
    }
}

fn tool_descriptor(tool: &Tool) -> McpResult<ToolDescriptor> {
    serde_json::to_value(tool)
        .and_then(serde_json::from_value)
        .map_err(|e| McpError::RemoteProtocol(format!("malformed tool '{}': {}", tool.name, e)))
}

fn call_result(result: &CallToolResult) -> McpResult<CallResult> {
    serde_json::to_value(result)
        .and_then(serde_json::from_value)
        .map_err(|e| McpError::RemoteProtocol(format!("malformed tool result: {}", e)))
}

#[async_trait]
impl RemoteSession for RmcpSession {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let tools = self.peer.list_all_tools().await.map_err(remote_error)?;
        tools.iter().map(tool_descriptor).collect()
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Option<CallResult>> {
        let request = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: arguments_object(arguments)?,
        };

        let result = self.peer.call_tool(request).await.map_err(remote_error)?;
        call_result(&result).map(Some)
    }

    async fn close(&self) -> McpResult<()> {
        let service = self.service.lock().take();
        if let Some(service) = service {
            service
                .cancel()
                .await
                .map_err(|e| McpError::RemoteProtocol(format!("close: {}", e)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_client_rejects_bad_header_value() {
        let http = HttpConfig::new("https://x.example.com/mcp").with_header("X-Token", "line\nbreak");
        let err = http_client(TransportKind::Sse, &http, &Settings::default()).unwrap_err();
        assert_eq!(err.name(), "TransportConnectError");
    }

    #[test]
    fn test_transport_loss_maps_to_hard_error() {
        assert!(remote_error(ServiceError::TransportClosed).is_hard());
    }

    #[test]
    fn test_arguments_must_be_object() {
        assert!(arguments_object(json!({ "a": 1 })).unwrap().is_some());
        assert!(arguments_object(Value::Null).unwrap().is_none());
        assert!(arguments_object(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_missing_command_fails_to_connect() {
        let descriptor =
            ServerDescriptor::stdio("ghost", "toolmux-definitely-not-a-command", Vec::<String>::new())
                .unwrap();

        let err = RmcpConnector::new()
            .connect(TransportKind::Stdio, &descriptor, &Settings::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.name(), "TransportConnectError");
    }

    #[tokio::test]
    async fn test_kind_must_match_descriptor() {
        let descriptor = ServerDescriptor::sse("docs", "https://docs.example.com/sse").unwrap();
        let err = RmcpConnector::new()
            .connect(TransportKind::Stdio, &descriptor, &Settings::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.name(), "UnsupportedTransportError");
    }
}
