//! In-memory configuration store

use async_trait::async_trait;
use tokio::sync::watch;

use super::traits::{ConfigError, ConfigResult, ConfigStore};
use crate::types::{ServerDescriptor, ServerSet};

/// In-memory configuration store
///
/// Every mutation is published to watchers.
#[derive(Debug)]
pub struct MemoryConfigStore {
    servers: watch::Sender<ServerSet>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConfigStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::with_servers(ServerSet::new())
    }

    /// Create a store with an initial server set
    pub fn with_servers(servers: ServerSet) -> Self {
        let (tx, _rx) = watch::channel(servers);
        Self { servers: tx }
    }

    /// Create a store from a list of descriptors
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ServerDescriptor>) -> Self {
        Self::with_servers(
            descriptors
                .into_iter()
                .map(|d| (d.name().to_string(), d))
                .collect(),
        )
    }

    /// Replace the whole server set
    pub fn set_servers(&self, servers: ServerSet) {
        self.servers.send_replace(servers);
    }

    /// Insert or replace one server
    pub fn insert(&self, descriptor: ServerDescriptor) {
        self.servers.send_modify(|set| {
            set.insert(descriptor.name().to_string(), descriptor);
        });
    }

    /// Remove all servers
    pub fn clear(&self) {
        self.servers.send_replace(ServerSet::new());
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ServerSet {
        self.servers.borrow().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> ConfigResult<ServerSet> {
        Ok(self.snapshot())
    }

    fn watch(&self) -> Option<watch::Receiver<ServerSet>> {
        Some(self.servers.subscribe())
    }

    async fn save(&self, descriptor: ServerDescriptor) -> ConfigResult<()> {
        self.insert(descriptor);
        Ok(())
    }

    async fn remove(&self, name: &str) -> ConfigResult<()> {
        let removed = self.servers.send_if_modified(|set| set.remove(name).is_some());
        if removed {
            Ok(())
        } else {
            Err(ConfigError::ServerNotFound(name.to_string()))
        }
    }
}
