//! Server descriptor types
//!
//! A [`ServerDescriptor`] is the validated, immutable description of one
//! tool-provider server. Configuration files hold the looser [`ServerEntry`]
//! shape; [`ServerDescriptor::from_entry`] is the only way from one to the other.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Desired server set, keyed by server name
pub type ServerSet = BTreeMap<String, ServerDescriptor>;

/// Wire protocol a server is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    Stdio,
    Sse,
    StreamableHttp,
    SimpleHttp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Stdio => "stdio",
            Protocol::Sse => "sse",
            Protocol::StreamableHttp => "streamable-http",
            Protocol::SimpleHttp => "simple-http",
        }
    }

    /// Parse a protocol name, accepting `_` as well as `-`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "stdio" => Some(Protocol::Stdio),
            "sse" => Some(Protocol::Sse),
            "streamable-http" | "http" => Some(Protocol::StreamableHttp),
            "simple-http" => Some(Protocol::SimpleHttp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subprocess transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, Option<String>>,
    cwd: Option<PathBuf>,
}

impl StdioConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into().trim().to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set one environment override; `None` removes the variable from the child
    pub fn with_env(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &BTreeMap<String, Option<String>> {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Full child environment: the host environment with the overlay applied
    pub fn merged_env(&self) -> BTreeMap<String, String> {
        merge_environment(std::env::vars(), &self.env)
    }
}

/// Merge an environment overlay over a host environment
///
/// Overlay values win; overlay entries without a value drop the variable.
pub fn merge_environment(
    host: impl IntoIterator<Item = (String, String)>,
    overlay: &BTreeMap<String, Option<String>>,
) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = host.into_iter().collect();
    for (key, value) in overlay {
        match value {
            Some(value) => {
                merged.insert(key.clone(), value.clone());
            }
            None => {
                merged.remove(key);
            }
        }
    }
    merged
}

/// URL-based transport settings (sse, streamable-http, simple-http)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    url: String,
    headers: BTreeMap<String, String>,
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Transport settings, one payload shape per protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerTransport {
    Stdio(StdioConfig),
    Sse(HttpConfig),
    StreamableHttp(HttpConfig),
    SimpleHttp(HttpConfig),
}

impl ServerTransport {
    pub fn protocol(&self) -> Protocol {
        match self {
            ServerTransport::Stdio(_) => Protocol::Stdio,
            ServerTransport::Sse(_) => Protocol::Sse,
            ServerTransport::StreamableHttp(_) => Protocol::StreamableHttp,
            ServerTransport::SimpleHttp(_) => Protocol::SimpleHttp,
        }
    }

    /// HTTP settings for URL-based transports
    pub fn http(&self) -> Option<&HttpConfig> {
        match self {
            ServerTransport::Stdio(_) => None,
            ServerTransport::Sse(http)
            | ServerTransport::StreamableHttp(http)
            | ServerTransport::SimpleHttp(http) => Some(http),
        }
    }
}

/// Validated description of one tool-provider server
///
/// Immutable: a configuration change produces a new descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    name: String,
    transport: ServerTransport,
}

impl ServerDescriptor {
    /// Build and validate a descriptor
    pub fn new(name: impl Into<String>, transport: ServerTransport) -> Result<Self, ConfigError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::validation("<unnamed>", "server name must not be empty"));
        }

        match &transport {
            ServerTransport::Stdio(stdio) => {
                if stdio.command.is_empty() {
                    return Err(ConfigError::validation(&name, "stdio command must not be empty"));
                }
            }
            ServerTransport::Sse(http)
            | ServerTransport::StreamableHttp(http)
            | ServerTransport::SimpleHttp(http) => {
                validate_url(&name, &http.url)?;
                for header in http.headers.keys() {
                    if reqwest::header::HeaderName::from_bytes(header.as_bytes()).is_err() {
                        return Err(ConfigError::validation(
                            &name,
                            format!("invalid header name '{}'", header),
                        ));
                    }
                }
            }
        }

        Ok(Self { name, transport })
    }

    /// Convenience constructor for a stdio server
    pub fn stdio(
        name: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            name,
            ServerTransport::Stdio(StdioConfig::new(command).with_args(args)),
        )
    }

    /// Convenience constructor for an SSE server
    pub fn sse(name: impl Into<String>, url: impl Into<String>) -> Result<Self, ConfigError> {
        Self::new(name, ServerTransport::Sse(HttpConfig::new(url)))
    }

    /// Convenience constructor for a streamable HTTP server
    pub fn streamable_http(
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::new(name, ServerTransport::StreamableHttp(HttpConfig::new(url)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &ServerTransport {
        &self.transport
    }

    pub fn protocol(&self) -> Protocol {
        self.transport.protocol()
    }

    /// Validate a configuration entry into a descriptor
    ///
    /// When `protocol` is absent it is inferred: `command` means stdio,
    /// `url` means sse.
    pub fn from_entry(name: &str, entry: &ServerEntry) -> Result<Self, ConfigError> {
        let protocol = match entry.protocol.as_deref() {
            Some(raw) => Protocol::parse(raw).ok_or_else(|| {
                ConfigError::validation(name, format!("unknown protocol '{}'", raw))
            })?,
            None if entry.command.is_some() => Protocol::Stdio,
            None if entry.url.is_some() => Protocol::Sse,
            None => {
                return Err(ConfigError::validation(
                    name,
                    "entry needs either a 'command' or a 'url'",
                ))
            }
        };

        let transport = match protocol {
            Protocol::Stdio => {
                let command = entry.command.as_deref().ok_or_else(|| {
                    ConfigError::validation(name, "stdio server requires 'command'")
                })?;
                let mut stdio = StdioConfig::new(command).with_args(entry.args.iter().cloned());
                stdio.env = entry.env.clone();
                stdio.cwd = entry.cwd.as_ref().map(PathBuf::from);
                ServerTransport::Stdio(stdio)
            }
            Protocol::Sse | Protocol::StreamableHttp | Protocol::SimpleHttp => {
                let url = entry.url.as_deref().ok_or_else(|| {
                    ConfigError::validation(name, format!("{} server requires 'url'", protocol))
                })?;
                let mut http = HttpConfig::new(url);
                http.headers = entry.headers.clone();
                match protocol {
                    Protocol::Sse => ServerTransport::Sse(http),
                    Protocol::StreamableHttp => ServerTransport::StreamableHttp(http),
                    _ => ServerTransport::SimpleHttp(http),
                }
            }
        };

        Self::new(name, transport)
    }

    /// Configuration entry for persisting this descriptor
    pub fn to_entry(&self) -> ServerEntry {
        let mut entry = ServerEntry {
            protocol: Some(self.protocol().as_str().to_string()),
            ..Default::default()
        };

        match &self.transport {
            ServerTransport::Stdio(stdio) => {
                entry.command = Some(stdio.command.clone());
                entry.args = stdio.args.clone();
                entry.env = stdio.env.clone();
                entry.cwd = stdio.cwd.as_ref().map(|p| p.to_string_lossy().into_owned());
            }
            ServerTransport::Sse(http)
            | ServerTransport::StreamableHttp(http)
            | ServerTransport::SimpleHttp(http) => {
                entry.url = Some(http.url.clone());
                entry.headers = http.headers.clone();
            }
        }

        entry
    }
}

fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ConfigError::validation(name, format!("invalid url '{}': {}", url, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::validation(
            name,
            format!("unsupported url scheme '{}'", other),
        )),
    }
}

/// One server entry as written in a configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Disabled entries are kept on disk but left out of the desired set
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

/// Validate every enabled entry into a server set
pub fn entries_to_server_set(
    entries: &BTreeMap<String, ServerEntry>,
) -> Result<ServerSet, ConfigError> {
    let mut servers = ServerSet::new();
    for (name, entry) in entries {
        if entry.disabled {
            continue;
        }
        let descriptor = ServerDescriptor::from_entry(name, entry)?;
        servers.insert(descriptor.name().to_string(), descriptor);
    }
    Ok(servers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_from_json(json: &str) -> ServerEntry {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_infers_stdio_from_command() {
        let entry = entry_from_json(r#"{"command": "echo", "args": ["hi"]}"#);
        let descriptor = ServerDescriptor::from_entry("a", &entry).unwrap();

        assert_eq!(descriptor.protocol(), Protocol::Stdio);
        match descriptor.transport() {
            ServerTransport::Stdio(stdio) => {
                assert_eq!(stdio.command(), "echo");
                assert_eq!(stdio.args().to_vec(), vec!["hi".to_string()]);
            }
            other => panic!("unexpected transport {:?}", other),
        }
    }

    #[test]
    fn test_infers_sse_from_url() {
        let entry = entry_from_json(r#"{"url": "https://x/sse", "headers": {"Authorization": "Bearer t"}}"#);
        let descriptor = ServerDescriptor::from_entry("b", &entry).unwrap();

        assert_eq!(descriptor.protocol(), Protocol::Sse);
        let http = descriptor.transport().http().unwrap();
        assert_eq!(http.url(), "https://x/sse");
        assert_eq!(http.headers().get("Authorization").unwrap(), "Bearer t");
    }

    #[test]
    fn test_explicit_protocol_wins() {
        let entry = entry_from_json(r#"{"protocol": "streamable_http", "url": "http://localhost:8080/mcp"}"#);
        let descriptor = ServerDescriptor::from_entry("c", &entry).unwrap();
        assert_eq!(descriptor.protocol(), Protocol::StreamableHttp);

        let entry = entry_from_json(r#"{"protocol": "simple-http", "url": "http://localhost:8080/rpc"}"#);
        let descriptor = ServerDescriptor::from_entry("d", &entry).unwrap();
        assert_eq!(descriptor.protocol(), Protocol::SimpleHttp);
    }

    #[test]
    fn test_rejects_bad_entries() {
        let cases = [
            r#"{}"#,
            r#"{"command": "   "}"#,
            r#"{"url": "not a url"}"#,
            r#"{"url": "ftp://x/sse"}"#,
            r#"{"protocol": "carrier-pigeon", "url": "https://x"}"#,
            r#"{"protocol": "stdio", "url": "https://x"}"#,
        ];

        for case in cases {
            let entry = entry_from_json(case);
            let result = ServerDescriptor::from_entry("bad", &entry);
            assert!(
                matches!(result, Err(ConfigError::Validation { .. })),
                "expected validation error for {}",
                case
            );
        }
    }

    #[test]
    fn test_rejects_empty_name() {
        assert!(matches!(
            ServerDescriptor::stdio("  ", "echo", Vec::<String>::new()),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_entry_round_trip_preserves_descriptor() {
        let descriptor = ServerDescriptor::new(
            "fs",
            ServerTransport::Stdio(
                StdioConfig::new("npx")
                    .with_args(["-y", "server-filesystem"])
                    .with_env("ROOT", Some("/tmp".to_string()))
                    .with_env("SECRET", None)
                    .with_cwd("/srv"),
            ),
        )
        .unwrap();

        let rebuilt = ServerDescriptor::from_entry("fs", &descriptor.to_entry()).unwrap();
        assert_eq!(rebuilt, descriptor);
    }

    #[test]
    fn test_descriptor_equality_is_structural() {
        let a = ServerDescriptor::sse("b", "https://x/sse").unwrap();
        let b = ServerDescriptor::sse("b", "https://x/sse").unwrap();
        let c = ServerDescriptor::streamable_http("b", "https://x/sse").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_merge_environment_overlay_wins_and_drops() {
        let host = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("HOME".to_string(), "/home/me".to_string()),
            ("TOKEN".to_string(), "leak".to_string()),
        ];
        let mut overlay = BTreeMap::new();
        overlay.insert("HOME".to_string(), Some("/sandbox".to_string()));
        overlay.insert("TOKEN".to_string(), None);
        overlay.insert("EXTRA".to_string(), Some("1".to_string()));

        let merged = merge_environment(host, &overlay);

        assert_eq!(merged.get("PATH").unwrap(), "/usr/bin");
        assert_eq!(merged.get("HOME").unwrap(), "/sandbox");
        assert_eq!(merged.get("EXTRA").unwrap(), "1");
        assert!(!merged.contains_key("TOKEN"));
    }

    #[test]
    fn test_disabled_entries_are_skipped() {
        let mut entries = BTreeMap::new();
        entries.insert("on".to_string(), entry_from_json(r#"{"command": "echo"}"#));
        entries.insert(
            "off".to_string(),
            entry_from_json(r#"{"command": "echo", "disabled": true}"#),
        );

        let servers = entries_to_server_set(&entries).unwrap();
        assert_eq!(servers.len(), 1);
        assert!(servers.contains_key("on"));
    }
}
