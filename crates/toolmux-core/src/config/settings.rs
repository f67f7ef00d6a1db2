//! Runtime settings read from the environment

use std::time::Duration;

pub const ENV_STDIO_DISABLED: &str = "TOOLMUX_STDIO_DISABLED";
pub const ENV_NO_INITIAL_CONNECT: &str = "TOOLMUX_NO_INITIAL_CONNECT";
pub const ENV_IDLE_DISCONNECT_SECS: &str = "TOOLMUX_IDLE_DISCONNECT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "TOOLMUX_CONNECT_TIMEOUT_SECS";

/// Settings the connection manager consumes but does not own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Refuse subprocess transports (serverless hosts cannot spawn)
    pub stdio_disabled: bool,
    /// Create connections without connecting them; `tools()` connects lazily
    pub lazy_connect: bool,
    /// Disconnect after this much inactivity
    pub idle_timeout: Option<Duration>,
    /// Connect timeout for HTTP-based transports
    pub connect_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            stdio_disabled: false,
            lazy_connect: false,
            idle_timeout: None,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            stdio_disabled: lookup(ENV_STDIO_DISABLED)
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.stdio_disabled),
            lazy_connect: lookup(ENV_NO_INITIAL_CONNECT)
                .map(|v| is_truthy(&v))
                .unwrap_or(defaults.lazy_connect),
            idle_timeout: match lookup(ENV_IDLE_DISCONNECT_SECS) {
                Some(raw) => parse_secs(&raw),
                None => defaults.idle_timeout,
            },
            connect_timeout: match lookup(ENV_CONNECT_TIMEOUT_SECS) {
                Some(raw) => parse_secs(&raw).or(defaults.connect_timeout),
                None => defaults.connect_timeout,
            },
        }
    }

    pub fn with_stdio_disabled(mut self, disabled: bool) -> Self {
        self.stdio_disabled = disabled;
        self
    }

    pub fn with_lazy_connect(mut self, lazy: bool) -> Self {
        self.lazy_connect = lazy;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Whole seconds; zero, negative or garbage means "off"
fn parse_secs(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
