//! Callable tool handles and qualified names

use std::collections::BTreeMap;
use std::sync::Weak;

use serde::Serialize;
use serde_json::Value;

use crate::mcp::{ConnectionMap, McpError};
use crate::types::{CallResult, CancellationToken, ToolDescriptor};

/// A remote tool as exposed to the LLM
///
/// Serializes to the shape the chat layer expects, including the provenance
/// fields `_mcpServerId` and `_originToolName`.
#[derive(Clone, Serialize)]
pub struct NormalizedToolHandle {
    #[serde(rename = "name")]
    qualified_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(rename = "inputSchema")]
    schema: Value,
    #[serde(rename = "_mcpServerId")]
    server_id: String,
    #[serde(rename = "_originToolName")]
    origin_name: String,
    #[serde(skip)]
    connections: Weak<ConnectionMap>,
}

impl NormalizedToolHandle {
    pub(crate) fn new(
        qualified_name: String,
        server_id: &str,
        tool: &ToolDescriptor,
        connections: Weak<ConnectionMap>,
    ) -> Self {
        Self {
            qualified_name,
            description: tool.description.clone(),
            schema: tool.normalized_schema(),
            server_id: server_id.to_string(),
            origin_name: tool.name.clone(),
            connections,
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn origin_name(&self) -> &str {
        &self.origin_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Input schema with `properties` defaulted and `additionalProperties: false`
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Invoke the tool on whichever connection currently serves its server
    pub async fn execute(&self, arguments: Value, cancel: &CancellationToken) -> CallResult {
        let connection = self.connections.upgrade().and_then(|map| {
            let current = map.read().get(&self.server_id).cloned();
            current
        });

        match connection {
            Some(connection) => {
                connection
                    .call_tool(&self.origin_name, arguments, cancel)
                    .await
            }
            None => CallResult::from(McpError::ServerNotFound(self.server_id.clone())),
        }
    }
}

impl std::fmt::Debug for NormalizedToolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NormalizedToolHandle")
            .field("qualified_name", &self.qualified_name)
            .field("server_id", &self.server_id)
            .field("origin_name", &self.origin_name)
            .finish()
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Base qualified name for a server's tool
pub fn qualified_name(server_id: &str, origin_name: &str) -> String {
    sanitize_name(&format!("{}_{}", server_id, origin_name))
}

/// Build the catalogue from per-server tool lists
///
/// Servers are visited in name order and tools in reported order, so
/// collision suffixes (`_2`, `_3`, ...) are stable across calls.
pub(crate) fn build_catalogue(
    servers: &BTreeMap<String, Vec<ToolDescriptor>>,
    connections: &Weak<ConnectionMap>,
) -> BTreeMap<String, NormalizedToolHandle> {
    let mut catalogue = BTreeMap::new();

    for (server_id, tools) in servers {
        for tool in tools {
            let base = qualified_name(server_id, &tool.name);
            let mut name = base.clone();
            let mut suffix = 2;
            while catalogue.contains_key(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }

            let handle = NormalizedToolHandle::new(name.clone(), server_id, tool, connections.clone());
            catalogue.insert(name, handle);
        }
    }

    catalogue
}
