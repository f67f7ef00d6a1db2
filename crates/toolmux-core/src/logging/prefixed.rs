//! Logger scoped to one component

use std::sync::Arc;

use super::traits::{Logger, SharedLogger};

/// Wraps another logger and prefixes every message
///
/// Each connection logs through one of these, e.g. `[McpConnection:github]`.
#[derive(Clone)]
pub struct PrefixedLogger {
    prefix: String,
    inner: SharedLogger,
}

impl PrefixedLogger {
    pub fn new(prefix: impl Into<String>, inner: SharedLogger) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    /// Shared logger scoped to `prefix`
    pub fn shared(prefix: impl Into<String>, inner: SharedLogger) -> SharedLogger {
        Arc::new(Self::new(prefix, inner))
    }

    fn scoped(&self, message: &str) -> String {
        format!("{} {}", self.prefix, message)
    }
}

impl Logger for PrefixedLogger {
    fn debug(&self, message: &str) {
        self.inner.debug(&self.scoped(message));
    }

    fn info(&self, message: &str) {
        self.inner.info(&self.scoped(message));
    }

    fn warn(&self, message: &str) {
        self.inner.warn(&self.scoped(message));
    }

    fn error(&self, message: &str) {
        self.inner.error(&self.scoped(message));
    }
}

impl std::fmt::Debug for PrefixedLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefixedLogger")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLogger};

    #[test]
    fn test_prefix_is_applied() {
        let memory = Arc::new(MemoryLogger::new());
        let logger = PrefixedLogger::shared("[McpConnection:github]", memory.clone());

        logger.warn("handshake slow");

        let entries = memory.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].message, "[McpConnection:github] handshake slow");
    }
}
