//! Logging abstractions for runtime-agnostic logging

#[macro_use]
mod traits;
mod console;
mod memory;
mod noop;
mod prefixed;

pub use console::ConsoleLogger;
pub use memory::{LogEntry, LogLevel, MemoryLogger};
pub use noop::NoOpLogger;
pub use prefixed::PrefixedLogger;
pub use traits::{Logger, SharedLogger};
