//! simple-http transport: one JSON-RPC request per HTTP POST
//!
//! No session state lives on the server side, so "connecting" only checks
//! that the endpoint answers JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{McpError, McpResult};
use super::rmcp_session::http_client;
use super::session::{RemoteSession, TransportKind};
use crate::config::Settings;
use crate::types::{CallResult, HttpConfig, ToolDescriptor};

const METHOD_NOT_FOUND: i64 = -32601;

/// Session speaking plain JSON-RPC over POST
#[derive(Debug)]
pub struct SimpleHttpSession {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ToolList {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}

impl SimpleHttpSession {
    /// Build the client and probe the endpoint with `initialize`
    pub async fn connect(http: &HttpConfig, settings: &Settings) -> McpResult<Self> {
        let session = Self {
            client: http_client(TransportKind::SimpleHttp, http, settings)?,
            url: http.url().to_string(),
            request_id: AtomicU64::new(0),
        };

        let probe = session
            .call(
                "initialize",
                json!({
                    "protocolVersion": "2025-03-26",
                    "capabilities": {},
                    "clientInfo": {
                        "name": "toolmux-core",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await;

        match probe {
            Ok(_) => Ok(session),
            // Reachable, just no handshake support
            Err(RpcFailure::Rpc { code, .. }) if code == METHOD_NOT_FOUND => Ok(session),
            Err(err) => Err(McpError::transport_connect("simple-http", err)),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(RpcFailure::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcFailure::Http(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcFailure::InvalidResponse(e.to_string()))?;
        parse_response(body)
    }
}

/// Why a JSON-RPC exchange failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum RpcFailure {
    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RpcFailure {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            RpcFailure::Unreachable(err.to_string())
        } else {
            RpcFailure::InvalidResponse(err.to_string())
        }
    }
}

impl From<RpcFailure> for McpError {
    fn from(err: RpcFailure) -> Self {
        match err {
            RpcFailure::Unreachable(message) => McpError::TransportClosed(message),
            other => McpError::RemoteProtocol(other.to_string()),
        }
    }
}

fn parse_response(response: Value) -> Result<Value, RpcFailure> {
    if let Some(error) = response.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(RpcFailure::Rpc { code, message });
    }

    response
        .get("result")
        .cloned()
        .ok_or_else(|| RpcFailure::InvalidResponse("Missing result field".to_string()))
}

#[async_trait]
impl RemoteSession for SimpleHttpSession {
    async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let result = self.call("tools/list", json!({})).await?;
        let list: ToolList = serde_json::from_value(result)
            .map_err(|e| McpError::RemoteProtocol(format!("malformed tool list: {}", e)))?;
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<Option<CallResult>> {
        let result = self
            .call("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| McpError::RemoteProtocol(format!("malformed tool result: {}", e)))
    }

    async fn close(&self) -> McpResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_result() {
        let result = parse_response(json!({ "jsonrpc": "2.0", "id": 1, "result": { "tools": [] } }));
        assert_eq!(result.unwrap(), json!({ "tools": [] }));
    }

    #[test]
    fn test_parse_response_error() {
        let result = parse_response(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32601, "message": "Method not found" }
        }));
        assert_eq!(
            result.unwrap_err(),
            RpcFailure::Rpc {
                code: METHOD_NOT_FOUND,
                message: "Method not found".to_string()
            }
        );
    }

    #[test]
    fn test_parse_response_missing_result() {
        let result = parse_response(json!({ "jsonrpc": "2.0", "id": 1 }));
        assert!(matches!(result, Err(RpcFailure::InvalidResponse(_))));
    }

    #[test]
    fn test_unreachable_is_hard_error() {
        let err: McpError = RpcFailure::Unreachable("connection refused".into()).into();
        assert!(err.is_hard());

        let err: McpError = RpcFailure::Http(500).into();
        assert_eq!(err.name(), "RemoteProtocolError");
    }

    #[test]
    fn test_tool_list_shape() {
        let list: ToolList = serde_json::from_value(json!({
            "tools": [{ "name": "search", "inputSchema": { "type": "object" } }]
        }))
        .unwrap();
        assert_eq!(list.tools[0].name, "search");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let http = HttpConfig::new("http://127.0.0.1:9/rpc");
        let err = SimpleHttpSession::connect(&http, &Settings::default())
            .await
            .unwrap_err();
        assert_eq!(err.name(), "TransportConnectError");
    }
}
