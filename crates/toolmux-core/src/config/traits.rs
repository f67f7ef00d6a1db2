//! Configuration store trait

use async_trait::async_trait;
use tokio::sync::watch;

use crate::types::{ServerDescriptor, ServerSet};

/// Source of the desired server set
///
/// Implementations:
/// - `MemoryConfigStore`: In-memory, watchable and writable
/// - `FileConfigStore`: YAML/JSON file (`{mcpServers: {...}}`)
/// - `LayeredConfigStore`: Later stores override earlier ones
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the current desired set
    async fn load(&self) -> ConfigResult<ServerSet>;

    /// Subscribe to changes of the desired set
    ///
    /// `None` means the store never changes underneath the manager. The
    /// receiver only yields the latest snapshot; intermediate ones may be
    /// skipped.
    fn watch(&self) -> Option<watch::Receiver<ServerSet>> {
        None
    }

    /// Insert or replace a server
    async fn save(&self, _descriptor: ServerDescriptor) -> ConfigResult<()> {
        Err(ConfigError::ReadOnly)
    }

    /// Remove a server by name
    async fn remove(&self, _name: &str) -> ConfigResult<()> {
        Err(ConfigError::ReadOnly)
    }
}

/// Errors that can occur during configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for server '{server}': {message}")]
    Validation { server: String, message: String },

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Configuration store is read-only")]
    ReadOnly,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Other(String),
}

impl ConfigError {
    pub fn validation(server: &str, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            server: server.to_string(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
