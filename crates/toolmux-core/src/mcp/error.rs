//! MCP error taxonomy

use thiserror::Error;

use crate::config::ConfigError;
use crate::types::CallResult;

/// Errors raised while connecting to or calling an MCP server
///
/// These never escape `connect()` or `call_tool()`; they end up as the
/// connection's last error or inside a failure envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum McpError {
    #[error("Invalid server configuration: {0}")]
    ConfigValidation(String),

    #[error("{0} transport is not supported")]
    UnsupportedTransport(String),

    #[error("{transport} connection failed: {message}")]
    TransportConnect { transport: String, message: String },

    #[error("{0}")]
    RemoteProtocol(String),

    #[error("Tool call failed with null")]
    NullResult,

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("MCP Server is currently in an error state. Please check the configuration and try refreshing the server.")]
    ErrorState,

    #[error("Not connected to MCP server '{0}'")]
    NotConnected(String),

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("Tool call was cancelled")]
    Cancelled,
}

impl McpError {
    /// Name reported in failure envelopes
    pub fn name(&self) -> &'static str {
        match self {
            McpError::ConfigValidation(_) => "ConfigValidationError",
            McpError::UnsupportedTransport(_) => "UnsupportedTransportError",
            McpError::TransportConnect { .. } => "TransportConnectError",
            McpError::RemoteProtocol(_) => "RemoteProtocolError",
            McpError::NullResult => "NullResultError",
            McpError::TransportClosed(_) => "TransportClosedError",
            McpError::ErrorState => "ErrorStateError",
            McpError::NotConnected(_) => "NotConnectedError",
            McpError::ServerNotFound(_) => "ServerNotFoundError",
            McpError::Cancelled => "AbortError",
        }
    }

    pub fn transport_connect(transport: impl Into<String>, message: impl ToString) -> Self {
        McpError::TransportConnect {
            transport: transport.into(),
            message: message.to_string(),
        }
    }

    /// Whether the session is gone and the connection must be torn down
    pub fn is_hard(&self) -> bool {
        matches!(self, McpError::TransportClosed(_))
    }
}

impl From<ConfigError> for McpError {
    fn from(err: ConfigError) -> Self {
        McpError::ConfigValidation(err.to_string())
    }
}

impl From<&McpError> for CallResult {
    fn from(err: &McpError) -> Self {
        CallResult::error(err.name(), &err.to_string())
    }
}

impl From<McpError> for CallResult {
    fn from(err: McpError) -> Self {
        CallResult::from(&err)
    }
}

pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_carries_name_and_message() {
        let err = McpError::transport_connect("sse", "connection refused");
        let result = CallResult::from(&err);

        let (message, name) = result.error_payload().unwrap();
        assert_eq!(name, "TransportConnectError");
        assert_eq!(message, "sse connection failed: connection refused");
    }

    #[test]
    fn test_error_state_message() {
        let (message, name) = CallResult::from(McpError::ErrorState).error_payload().unwrap();
        assert_eq!(name, "ErrorStateError");
        assert!(message.starts_with("MCP Server is currently in an error state"));
    }

    #[test]
    fn test_only_transport_closed_is_hard() {
        assert!(McpError::TransportClosed("eof".into()).is_hard());
        assert!(!McpError::RemoteProtocol("tool not found".into()).is_hard());
        assert!(!McpError::NullResult.is_hard());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: McpError = ConfigError::validation("a", "stdio command must not be empty").into();
        assert_eq!(err.name(), "ConfigValidationError");
    }
}
