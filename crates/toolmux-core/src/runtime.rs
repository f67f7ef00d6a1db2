//! Process-wide manager handle

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::config::{ConfigResult, ConfigStore, Settings};
use crate::logging::SharedLogger;
use crate::mcp::{McpManager, RmcpConnector, SessionConnector};

/// Builds one [`McpManager`] on first use and tears it down on request
///
/// Construct it once at startup and pass it by reference:
///
/// ```rust,ignore
/// let runtime = McpRuntime::new(
///     Arc::new(FileConfigStore::user()),
///     Settings::from_env(),
///     Arc::new(ConsoleLogger::new()),
/// );
///
/// let manager = runtime.get().await?;
/// let tools = manager.tools().await;
///
/// runtime.shutdown().await;
/// ```
pub struct McpRuntime {
    store: Arc<dyn ConfigStore>,
    connector: Arc<dyn SessionConnector>,
    settings: Settings,
    logger: SharedLogger,
    manager: OnceCell<Arc<McpManager>>,
}

impl McpRuntime {
    pub fn new(store: Arc<dyn ConfigStore>, settings: Settings, logger: SharedLogger) -> Self {
        Self::with_connector(store, Arc::new(RmcpConnector::new()), settings, logger)
    }

    pub fn with_connector(
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn SessionConnector>,
        settings: Settings,
        logger: SharedLogger,
    ) -> Self {
        Self {
            store,
            connector,
            settings,
            logger,
            manager: OnceCell::new(),
        }
    }

    /// The manager, initialized and watching the store
    ///
    /// Concurrent first callers share a single initialization. A failed
    /// load is returned and retried on the next call.
    pub async fn get(&self) -> ConfigResult<Arc<McpManager>> {
        let manager = self
            .manager
            .get_or_init(|| async {
                log_debug!(self.logger, "[McpRuntime] Creating manager");
                Arc::new(McpManager::new(
                    self.store.clone(),
                    self.connector.clone(),
                    self.settings.clone(),
                    self.logger.clone(),
                ))
            })
            .await
            .clone();

        manager.init().await?;
        if !manager.is_watching() {
            manager.watch();
        }
        Ok(manager)
    }

    /// Whether `get` has built the manager yet
    pub fn is_started(&self) -> bool {
        self.manager.initialized()
    }

    /// Stop watching and close every connection
    ///
    /// A later `get` initializes again from the store.
    pub async fn shutdown(&self) {
        if let Some(manager) = self.manager.get() {
            log_info!(self.logger, "[McpRuntime] Shutting down");
            manager.exit().await;
        }
    }
}

impl std::fmt::Debug for McpRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpRuntime")
            .field("settings", &self.settings)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, MemoryConfigStore};
    use crate::logging::{LogLevel, MemoryLogger, NoOpLogger};
    use crate::mcp::MockConnector;
    use crate::types::{ServerDescriptor, ServerSet};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn runtime(connector: Arc<MockConnector>) -> McpRuntime {
        let store = MemoryConfigStore::from_descriptors([
            ServerDescriptor::sse("docs", "https://docs.example.com/sse").unwrap(),
        ]);
        McpRuntime::with_connector(
            Arc::new(store),
            connector,
            Settings::default(),
            Arc::new(NoOpLogger::new()),
        )
    }

    #[tokio::test]
    async fn test_get_initializes_once() {
        let connector = Arc::new(MockConnector::new());
        let runtime = runtime(connector.clone());
        assert!(!runtime.is_started());

        let (first, second) = tokio::join!(runtime.get(), runtime.get());
        let first = first.unwrap();
        let second = second.unwrap();
        let third = runtime.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(connector.handshakes("docs"), 1);
        assert!(first.is_watching());
    }

    #[tokio::test]
    async fn test_shutdown_then_get_reinitializes() {
        let connector = Arc::new(MockConnector::new());
        let runtime = runtime(connector.clone());

        let manager = runtime.get().await.unwrap();
        runtime.shutdown().await;
        assert_eq!(connector.open_sessions("docs"), 0);
        assert!(manager.infos().is_empty());

        let manager = runtime.get().await.unwrap();
        assert_eq!(manager.server_names(), vec!["docs"]);
        assert_eq!(connector.handshakes("docs"), 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_get_is_noop() {
        let logger = Arc::new(MemoryLogger::new());
        let runtime = McpRuntime::with_connector(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(MockConnector::new()),
            Settings::default(),
            logger.clone(),
        );

        runtime.shutdown().await;
        assert!(!runtime.is_started());
        assert!(!logger.contains(LogLevel::Info, "Shutting down"));
    }

    struct FlakyStore {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ConfigStore for FlakyStore {
        async fn load(&self) -> ConfigResult<ServerSet> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ConfigError::Parse("Failed to parse YAML: unexpected end".to_string()))
            } else {
                Ok(ServerSet::new())
            }
        }
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let runtime = McpRuntime::with_connector(
            Arc::new(FlakyStore {
                loads: AtomicUsize::new(0),
            }),
            Arc::new(MockConnector::new()),
            Settings::default(),
            Arc::new(NoOpLogger::new()),
        );

        assert!(matches!(runtime.get().await, Err(ConfigError::Parse(_))));
        assert!(runtime.get().await.unwrap().infos().is_empty());
    }
}
