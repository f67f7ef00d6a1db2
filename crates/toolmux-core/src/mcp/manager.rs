//! Connection manager: reconciles live connections against the desired set

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;

use super::connection::{McpConnection, ServerInfo};
use super::error::McpError;
use super::rmcp_session::RmcpConnector;
use super::session::SessionConnector;
use crate::config::{ConfigResult, ConfigStore, Settings};
use crate::logging::{PrefixedLogger, SharedLogger};
use crate::tools::{build_catalogue, NormalizedToolHandle};
use crate::types::{CallResult, CancellationToken, ServerDescriptor, ServerSet, ToolDescriptor};

/// Live connections keyed by server name
pub type ConnectionMap = RwLock<BTreeMap<String, Arc<McpConnection>>>;

/// Owns one [`McpConnection`] per configured server
///
/// # Example
///
/// ```rust,ignore
/// use toolmux_core::{McpManager, FileConfigStore, Settings, ConsoleLogger};
/// use std::sync::Arc;
///
/// let manager = Arc::new(McpManager::with_rmcp(
///     Arc::new(FileConfigStore::user()),
///     Settings::from_env(),
///     Arc::new(ConsoleLogger::new()),
/// ));
/// manager.init().await?;
/// manager.watch();
///
/// for (name, tool) in manager.tools().await {
///     println!("{} -> {}", name, tool.origin_name());
/// }
/// ```
pub struct McpManager {
    store: Arc<dyn ConfigStore>,
    connector: Arc<dyn SessionConnector>,
    settings: Settings,
    connections: Arc<ConnectionMap>,
    reconcile_lock: tokio::sync::Mutex<()>,
    initialized: tokio::sync::Mutex<bool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    base_logger: SharedLogger,
    logger: SharedLogger,
}

impl McpManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        connector: Arc<dyn SessionConnector>,
        settings: Settings,
        logger: SharedLogger,
    ) -> Self {
        Self {
            store,
            connector,
            settings,
            connections: Arc::new(RwLock::new(BTreeMap::new())),
            reconcile_lock: tokio::sync::Mutex::new(()),
            initialized: tokio::sync::Mutex::new(false),
            watcher: Mutex::new(None),
            logger: PrefixedLogger::shared("[McpManager]", logger.clone()),
            base_logger: logger,
        }
    }

    /// Manager using the real rmcp-backed transports
    pub fn with_rmcp(store: Arc<dyn ConfigStore>, settings: Settings, logger: SharedLogger) -> Self {
        Self::new(store, Arc::new(RmcpConnector::new()), settings, logger)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load the desired set and reconcile; runs once
    ///
    /// Fails only when the store cannot produce a valid server set.
    pub async fn init(&self) -> ConfigResult<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        let desired = self.store.load().await?;
        log_info!(self.logger, "Initializing with {} server(s)", desired.len());
        self.reconcile(desired).await;
        *initialized = true;
        Ok(())
    }

    /// Reload the store and reconcile against it
    pub async fn reload(&self) -> ConfigResult<()> {
        let desired = self.store.load().await?;
        self.reconcile(desired).await;
        Ok(())
    }

    /// Bring the live map in line with `desired`
    ///
    /// Removed and changed servers are disconnected first, then new and
    /// changed ones are created (and connected unless connecting lazily).
    /// Unchanged servers are left alone.
    pub async fn reconcile(&self, desired: ServerSet) {
        let _serial = self.reconcile_lock.lock().await;
        let current = self.connections.read().clone();

        let mut removed = Vec::new();
        let mut added = Vec::new();
        for (name, connection) in &current {
            match desired.get(name) {
                None => removed.push(connection.clone()),
                Some(descriptor) if descriptor != connection.descriptor() => {
                    removed.push(connection.clone());
                    added.push(descriptor.clone());
                }
                Some(_) => {}
            }
        }
        for (name, descriptor) in &desired {
            if !current.contains_key(name) {
                added.push(descriptor.clone());
            }
        }

        if removed.is_empty() && added.is_empty() {
            return;
        }
        log_info!(
            self.logger,
            "Reconciling: {} to remove, {} to add",
            removed.len(),
            added.len()
        );

        {
            let mut map = self.connections.write();
            for connection in &removed {
                map.remove(connection.name());
            }
        }
        join_all(removed.iter().map(|c| c.retire())).await;

        let created: Vec<Arc<McpConnection>> = added
            .into_iter()
            .map(|descriptor| {
                McpConnection::new(
                    descriptor,
                    self.connector.clone(),
                    self.settings.clone(),
                    self.base_logger.clone(),
                )
            })
            .collect();
        {
            let mut map = self.connections.write();
            for connection in &created {
                map.insert(connection.name().to_string(), connection.clone());
            }
        }

        if !self.settings.lazy_connect {
            join_all(created.iter().map(|c| c.connect())).await;
        }
    }

    fn snapshot(&self) -> Vec<Arc<McpConnection>> {
        self.connections.read().values().cloned().collect()
    }

    fn connection(&self, name: &str) -> Option<Arc<McpConnection>> {
        self.connections.read().get(name).cloned()
    }

    /// Current server names, sorted
    pub fn server_names(&self) -> Vec<String> {
        self.connections.read().keys().cloned().collect()
    }

    /// Aggregated tool catalogue, computed fresh on every call
    ///
    /// Connections that are neither connected nor failed (lazy mode, or
    /// evicted for idleness) are connected first.
    pub async fn tools(&self) -> BTreeMap<String, NormalizedToolHandle> {
        let connections = self.snapshot();

        let pending: Vec<_> = connections
            .iter()
            .filter(|c| !c.is_connected() && c.last_error().is_none())
            .collect();
        if !pending.is_empty() {
            join_all(pending.iter().map(|c| c.connect())).await;
        }

        let servers: BTreeMap<String, Vec<ToolDescriptor>> = connections
            .iter()
            .filter(|c| c.is_connected())
            .map(|c| (c.name().to_string(), c.tool_descriptors()))
            .collect();

        build_catalogue(&servers, &Arc::downgrade(&self.connections))
    }

    /// Snapshot of one server; `None` for an unknown name
    pub fn info(&self, name: &str) -> Option<ServerInfo> {
        self.connection(name).map(|c| c.info())
    }

    /// Snapshots of every server, in name order
    pub fn infos(&self) -> Vec<ServerInfo> {
        self.snapshot().iter().map(|c| c.info()).collect()
    }

    /// Call a tool by server name and original tool name
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> CallResult {
        match self.connection(server) {
            Some(connection) => connection.call_tool(tool, arguments, cancel).await,
            None => {
                log_warn!(self.logger, "Tool call for unknown server '{}'", server);
                CallResult::from(McpError::ServerNotFound(server.to_string()))
            }
        }
    }

    /// Disconnect and reconnect one server
    pub async fn refresh(&self, name: &str) -> Option<ServerInfo> {
        let connection = self.connection(name)?;
        connection.refresh().await;
        Some(connection.info())
    }

    /// Save a server through the store, then reconcile
    pub async fn persist_server(&self, descriptor: ServerDescriptor) -> ConfigResult<()> {
        log_info!(self.logger, "Persisting server '{}'", descriptor.name());
        self.store.save(descriptor).await?;
        self.reload().await
    }

    /// Remove a server through the store, then reconcile
    pub async fn remove_server(&self, name: &str) -> ConfigResult<()> {
        log_info!(self.logger, "Removing server '{}'", name);
        self.store.remove(name).await?;
        self.reload().await
    }

    /// Reconcile on every change the store reports
    ///
    /// Returns `false` when the store cannot be watched. Calling it again
    /// replaces the previous subscription.
    pub fn watch(self: &Arc<Self>) -> bool {
        let Some(mut changes) = self.store.watch() else {
            return false;
        };

        let manager = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let desired = changes.borrow_and_update().clone();
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.reconcile(desired).await;
            }
        });

        if let Some(previous) = self.watcher.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Whether a store subscription is live
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop watching and disconnect everything
    ///
    /// Locks are taken in the same order as `init`: init flag, then reconcile.
    pub async fn exit(&self) {
        let mut initialized = self.initialized.lock().await;
        let _serial = self.reconcile_lock.lock().await;

        // Holding the reconcile lock, the watcher is never mid-reconcile here.
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }

        let connections: Vec<_> = {
            let mut map = self.connections.write();
            std::mem::take(&mut *map).into_values().collect()
        };
        log_info!(self.logger, "Exiting, closing {} connection(s)", connections.len());
        join_all(connections.iter().map(|c| c.retire())).await;
        *initialized = false;
    }
}

impl Drop for McpManager {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("servers", &self.server_names())
            .field("settings", &self.settings)
            .finish()
    }
}
