//! Console logger implementation

use super::traits::Logger;

/// A logger that outputs to the console
///
/// Everything goes to stderr: stdio MCP servers own stdout of *their*
/// process, and embedding hosts often reserve ours as well.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    prefix: String,
    debug_enabled: bool,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleLogger {
    /// Create a new console logger; debug output follows `TOOLMUX_DEBUG`
    pub fn new() -> Self {
        let debug_enabled = std::env::var("TOOLMUX_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self {
            prefix: "[toolmux]".to_string(),
            debug_enabled,
        }
    }

    /// Create a console logger with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::new()
        }
    }

    /// Force debug output on or off
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    fn line(&self, level: &str, message: &str) -> String {
        format!("{} {}: {}", self.prefix, level, message)
    }
}

impl Logger for ConsoleLogger {
    fn debug(&self, message: &str) {
        if self.debug_enabled {
            eprintln!("{}", self.line("DEBUG", message));
        }
    }

    fn info(&self, message: &str) {
        eprintln!("{}", self.line("INFO", message));
    }

    fn warn(&self, message: &str) {
        eprintln!("{}", self.line("WARN", message));
    }

    fn error(&self, message: &str) {
        eprintln!("{}", self.line("ERROR", message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_logger_line_format() {
        let logger = ConsoleLogger::with_prefix("[MyApp]");
        assert_eq!(logger.line("WARN", "slow handshake"), "[MyApp] WARN: slow handshake");
    }

    #[test]
    fn test_console_logger_logs() {
        let logger = ConsoleLogger::new().with_debug(true);
        logger.debug("debug message");
        logger.info("info message");
        logger.warn("warn message");
        logger.error("error message");
    }
}
