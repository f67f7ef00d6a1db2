//! Configuration store abstractions
//!
//! Supports multiple configuration sources:
//! - `MemoryConfigStore`: In-memory, for tests and embedding
//! - `FileConfigStore`: YAML/JSON file-based (user/workspace level)
//! - `LayeredConfigStore`: Several stores merged in order
//!
//! `Settings` carries the environment-driven knobs.

mod file;
mod layered;
mod memory;
mod settings;
mod traits;

pub use file::{ConfigFile, ConfigLevel, FileConfigStore};
pub use layered::LayeredConfigStore;
pub use memory::MemoryConfigStore;
pub use settings::{
    Settings, ENV_CONNECT_TIMEOUT_SECS, ENV_IDLE_DISCONNECT_SECS, ENV_NO_INITIAL_CONNECT,
    ENV_STDIO_DISABLED,
};
pub use traits::{ConfigError, ConfigResult, ConfigStore};
