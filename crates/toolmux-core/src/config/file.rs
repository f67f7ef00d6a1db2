//! File-based configuration store (YAML or JSON)
//!
//! Supports user-level (~/.config/toolmux/mcp.yaml) and workspace-level
//! (.config/toolmux/mcp.yaml) config. Files ending in `.json` are read and
//! written as JSON; everything else is YAML.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::traits::{ConfigError, ConfigResult, ConfigStore};
use crate::logging::{NoOpLogger, SharedLogger};
use crate::types::{entries_to_server_set, ServerDescriptor, ServerEntry, ServerSet};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ConfigFile {
    /// Configured servers, keyed by name
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, ServerEntry>,
}

impl ConfigFile {
    /// Validate the enabled entries into a server set
    pub fn server_set(&self) -> ConfigResult<ServerSet> {
        entries_to_server_set(&self.mcp_servers)
    }
}

/// Config level (user or workspace)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLevel {
    /// User-level config (~/.config/toolmux/mcp.yaml)
    User,
    /// Workspace-level config (.config/toolmux/mcp.yaml in workspace root)
    Workspace,
}

impl ConfigLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigLevel::User => "user",
            ConfigLevel::Workspace => "workspace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    fn parse(self, content: &str) -> ConfigResult<ConfigFile> {
        if content.trim().is_empty() {
            return Ok(ConfigFile::default());
        }
        match self {
            FileFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e))),
            FileFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::Parse(format!("Failed to parse JSON: {}", e))),
        }
    }

    fn render(self, config: &ConfigFile) -> ConfigResult<String> {
        match self {
            FileFormat::Yaml => serde_yaml::to_string(config)
                .map_err(|e| ConfigError::Other(format!("Failed to serialize YAML: {}", e))),
            FileFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        }
    }
}

/// File-based configuration store
///
/// # Example
///
/// ```no_run
/// use toolmux_core::config::FileConfigStore;
///
/// // User-level config
/// let user_config = FileConfigStore::user();
///
/// // Workspace-level config
/// let workspace_config = FileConfigStore::workspace("/path/to/workspace");
/// ```
pub struct FileConfigStore {
    path: PathBuf,
    level: ConfigLevel,
    format: FileFormat,
    poll_interval: Duration,
    cache: RwLock<Option<ConfigFile>>,
    watcher: Mutex<Option<FileWatcher>>,
    logger: SharedLogger,
}

struct FileWatcher {
    tx: watch::Sender<ServerSet>,
    task: JoinHandle<()>,
}

impl FileConfigStore {
    /// Create a new file config store for a specific path
    pub fn new(path: impl Into<PathBuf>, level: ConfigLevel) -> Self {
        let path = path.into();
        Self {
            format: FileFormat::for_path(&path),
            path,
            level,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cache: RwLock::new(None),
            watcher: Mutex::new(None),
            logger: Arc::new(NoOpLogger::new()),
        }
    }

    /// Create a user-level config store (~/.config/toolmux/mcp.yaml)
    pub fn user() -> Self {
        let config_dir = dirs::config_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        });
        Self::new(config_dir.join("toolmux").join("mcp.yaml"), ConfigLevel::User)
    }

    /// Create a workspace-level config store (.config/toolmux/mcp.yaml)
    pub fn workspace(workspace_root: impl AsRef<Path>) -> Self {
        let path = workspace_root
            .as_ref()
            .join(".config")
            .join("toolmux")
            .join("mcp.yaml");
        Self::new(path, ConfigLevel::Workspace)
    }

    /// How often `watch` checks the file's modification time
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Logger for problems found while watching
    pub fn with_logger(mut self, logger: SharedLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the config level
    pub fn level(&self) -> ConfigLevel {
        self.level
    }

    /// Check if the config file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_file(path: &Path, format: FileFormat) -> ConfigResult<ConfigFile> {
        if !path.exists() {
            return Ok(ConfigFile::default());
        }
        let content = fs::read_to_string(path)?;
        format.parse(&content)
    }

    fn write_file(&self, config: &ConfigFile) -> ConfigResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = self.format.render(config)?;
        fs::write(&self.path, content)?;

        *self.cache.write() = Some(config.clone());

        // Push our own writes to watchers right away instead of on the next poll.
        if let Some(watcher) = self.watcher.lock().as_ref() {
            if let Ok(servers) = config.server_set() {
                watcher.tx.send_if_modified(|current| replace_if_changed(current, servers));
            }
        }

        Ok(())
    }

    /// Get cached or load config
    pub fn config(&self) -> ConfigResult<ConfigFile> {
        if let Some(config) = self.cache.read().as_ref() {
            return Ok(config.clone());
        }

        let config = Self::read_file(&self.path, self.format)?;
        *self.cache.write() = Some(config.clone());
        Ok(config)
    }

    /// Reload config from disk (invalidate cache)
    pub fn reload(&self) -> ConfigResult<ConfigFile> {
        let config = Self::read_file(&self.path, self.format)?;
        *self.cache.write() = Some(config.clone());
        Ok(config)
    }

    /// Raw entries, including disabled ones
    pub fn entries(&self) -> ConfigResult<BTreeMap<String, ServerEntry>> {
        Ok(self.config()?.mcp_servers)
    }

    /// Insert or replace a raw entry
    pub fn set_entry(&self, name: &str, entry: ServerEntry) -> ConfigResult<()> {
        ServerDescriptor::from_entry(name, &entry)?;
        let mut config = self.config()?;
        config.mcp_servers.insert(name.to_string(), entry);
        self.write_file(&config)
    }

    /// Create a backup of the current config file
    pub fn backup(&self) -> ConfigResult<Option<PathBuf>> {
        if !self.exists() {
            return Ok(None);
        }

        let extension = match self.path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.backup", ext),
            None => "backup".to_string(),
        };
        let backup_path = self.path.with_extension(extension);
        fs::copy(&self.path, &backup_path)?;
        Ok(Some(backup_path))
    }

    /// Export config as JSON
    pub fn export_json(&self) -> ConfigResult<String> {
        let config = self.config()?;
        Ok(serde_json::to_string_pretty(&config)?)
    }

    /// Import config from JSON, e.g. an existing `mcp.json`
    pub fn import_json(&self, json: &str) -> ConfigResult<()> {
        let config = FileFormat::Json.parse(json)?;
        config.server_set()?;
        self.write_file(&config)
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn replace_if_changed(current: &mut ServerSet, next: ServerSet) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}

async fn poll_file(
    path: PathBuf,
    format: FileFormat,
    interval: Duration,
    tx: watch::Sender<ServerSet>,
    logger: SharedLogger,
) {
    let mut last_modified = modified_at(&path);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if tx.is_closed() {
            break;
        }

        let modified = modified_at(&path);
        if modified == last_modified {
            continue;
        }
        last_modified = modified;

        // Watchers keep the last good snapshot across invalid edits.
        let servers = match FileConfigStore::read_file(&path, format).and_then(|c| c.server_set()) {
            Ok(servers) => servers,
            Err(err) => {
                log_warn!(
                    logger,
                    "[FileConfigStore] Ignoring invalid edit to {}: {}",
                    path.display(),
                    err
                );
                continue;
            }
        };
        tx.send_if_modified(|current| replace_if_changed(current, servers));
    }
}

impl std::fmt::Debug for FileConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigStore")
            .field("path", &self.path)
            .field("level", &self.level)
            .field("exists", &self.exists())
            .finish()
    }
}

impl Drop for FileConfigStore {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.task.abort();
        }
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> ConfigResult<ServerSet> {
        self.reload()?.server_set()
    }

    fn watch(&self) -> Option<watch::Receiver<ServerSet>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let mut watcher = self.watcher.lock();

        if let Some(existing) = watcher.as_ref() {
            if !existing.task.is_finished() {
                return Some(existing.tx.subscribe());
            }
        }

        let initial = self
            .config()
            .and_then(|c| c.server_set())
            .unwrap_or_default();
        let (tx, rx) = watch::channel(initial);
        let task = runtime.spawn(poll_file(
            self.path.clone(),
            self.format,
            self.poll_interval,
            tx.clone(),
            self.logger.clone(),
        ));
        *watcher = Some(FileWatcher { tx, task });

        Some(rx)
    }

    async fn save(&self, descriptor: ServerDescriptor) -> ConfigResult<()> {
        let mut config = self.config()?;
        config
            .mcp_servers
            .insert(descriptor.name().to_string(), descriptor.to_entry());
        self.write_file(&config)
    }

    async fn remove(&self, name: &str) -> ConfigResult<()> {
        let mut config = self.config()?;
        if config.mcp_servers.remove(name).is_none() {
            return Err(ConfigError::ServerNotFound(name.to_string()));
        }
        self.write_file(&config)
    }
}
