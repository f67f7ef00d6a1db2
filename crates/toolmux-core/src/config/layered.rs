//! Layered configuration store

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::select_all;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::traits::{ConfigError, ConfigResult, ConfigStore};
use crate::types::{ServerDescriptor, ServerSet};

/// Merges several stores into one desired set
///
/// Layers are applied in order, so a server defined by a later layer replaces
/// one with the same name from an earlier layer (workspace over user, for
/// instance). Writes go to the designated writable layer.
pub struct LayeredConfigStore {
    layers: Vec<Arc<dyn ConfigStore>>,
    writable: Option<usize>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl LayeredConfigStore {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            writable: None,
            forwarders: Mutex::new(Vec::new()),
        }
    }

    /// Add a layer on top of the existing ones
    pub fn with_layer(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.layers.push(store);
        self
    }

    /// Add a layer on top and route writes to it
    pub fn with_writable_layer(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.writable = Some(self.layers.len());
        self.layers.push(store);
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn writable_layer(&self) -> ConfigResult<&Arc<dyn ConfigStore>> {
        self.writable
            .and_then(|index| self.layers.get(index))
            .ok_or(ConfigError::ReadOnly)
    }
}

impl Default for LayeredConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn load_merged(layers: &[Arc<dyn ConfigStore>]) -> ConfigResult<ServerSet> {
    let mut merged = ServerSet::new();
    for layer in layers {
        merged.extend(layer.load().await?);
    }
    Ok(merged)
}

async fn forward_changes(
    layers: Vec<Arc<dyn ConfigStore>>,
    mut receivers: Vec<watch::Receiver<ServerSet>>,
    tx: watch::Sender<ServerSet>,
) {
    while !receivers.is_empty() {
        let (result, index) = {
            let pending = receivers.iter_mut().map(|rx| Box::pin(rx.changed()));
            let (result, index, rest) = select_all(pending).await;
            drop(rest);
            (result, index)
        };

        if result.is_err() {
            receivers.remove(index);
            continue;
        }
        if tx.is_closed() {
            break;
        }

        if let Ok(merged) = load_merged(&layers).await {
            tx.send_if_modified(|current| {
                if *current == merged {
                    false
                } else {
                    *current = merged;
                    true
                }
            });
        }
    }
}

#[async_trait]
impl ConfigStore for LayeredConfigStore {
    async fn load(&self) -> ConfigResult<ServerSet> {
        load_merged(&self.layers).await
    }

    fn watch(&self) -> Option<watch::Receiver<ServerSet>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let receivers: Vec<_> = self.layers.iter().filter_map(|l| l.watch()).collect();
        if receivers.is_empty() {
            return None;
        }

        let initial = receivers
            .iter()
            .fold(ServerSet::new(), |mut merged, rx| {
                merged.extend(rx.borrow().clone());
                merged
            });
        let (tx, rx) = watch::channel(initial);
        let task = runtime.spawn(forward_changes(self.layers.clone(), receivers, tx));

        let mut forwarders = self.forwarders.lock();
        forwarders.retain(|t| !t.is_finished());
        forwarders.push(task);

        Some(rx)
    }

    async fn save(&self, descriptor: ServerDescriptor) -> ConfigResult<()> {
        self.writable_layer()?.save(descriptor).await
    }

    async fn remove(&self, name: &str) -> ConfigResult<()> {
        self.writable_layer()?.remove(name).await
    }
}

impl Drop for LayeredConfigStore {
    fn drop(&mut self) {
        for task in self.forwarders.lock().drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for LayeredConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredConfigStore")
            .field("layers", &self.layers.len())
            .field("writable", &self.writable)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryConfigStore;
    use std::time::Duration;

    fn sse(name: &str, url: &str) -> ServerDescriptor {
        ServerDescriptor::sse(name, url).unwrap()
    }

    #[tokio::test]
    async fn test_later_layer_overrides() {
        let user = Arc::new(MemoryConfigStore::from_descriptors([
            sse("docs", "https://user.example.com/sse"),
            sse("search", "https://search.example.com/sse"),
        ]));
        let workspace = Arc::new(MemoryConfigStore::from_descriptors([sse(
            "docs",
            "https://workspace.example.com/sse",
        )]));

        let store = LayeredConfigStore::new()
            .with_layer(user)
            .with_writable_layer(workspace.clone());

        let servers = store.load().await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers["docs"], sse("docs", "https://workspace.example.com/sse"));

        store
            .save(sse("wiki", "https://wiki.example.com/sse"))
            .await
            .unwrap();
        assert!(workspace.snapshot().contains_key("wiki"));
    }

    #[tokio::test]
    async fn test_without_writable_layer_is_read_only() {
        let store = LayeredConfigStore::new().with_layer(Arc::new(MemoryConfigStore::new()));
        assert!(matches!(
            store.remove("docs").await,
            Err(ConfigError::ReadOnly)
        ));
    }

    #[tokio::test]
    async fn test_watch_merges_layer_changes() {
        let user = Arc::new(MemoryConfigStore::new());
        let workspace = Arc::new(MemoryConfigStore::new());
        let store = LayeredConfigStore::new()
            .with_layer(user.clone())
            .with_layer(workspace.clone());

        let mut rx = store.watch().unwrap();
        assert!(rx.borrow().is_empty());

        user.insert(sse("docs", "https://user.example.com/sse"));
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        workspace.insert(sse("docs", "https://workspace.example.com/sse"));
        tokio::time::timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            rx.borrow()["docs"],
            sse("docs", "https://workspace.example.com/sse")
        );
    }
}
