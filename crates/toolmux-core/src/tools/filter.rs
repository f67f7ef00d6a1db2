//! Narrowing a tool catalogue

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::handle::NormalizedToolHandle;

/// Include/exclude filter over a `tools()` snapshot
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    /// If set, only include tools with these qualified names
    pub include: Option<HashSet<String>>,
    /// Exclude tools with these qualified names
    pub exclude: HashSet<String>,
    /// If set, only include tools from these servers
    pub servers: Option<HashSet<String>>,
    /// Exclude these `(server, origin tool)` pairs
    pub exclude_origin: HashSet<(String, String)>,
}

impl ToolFilter {
    /// A filter that admits everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Include only specific tools
    pub fn with_include(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.include = Some(names.into_iter().collect());
        self
    }

    /// Exclude specific tools
    pub fn with_exclude(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude = names.into_iter().collect();
        self
    }

    /// Include only tools from these servers
    pub fn with_servers(mut self, servers: impl IntoIterator<Item = String>) -> Self {
        self.servers = Some(servers.into_iter().collect());
        self
    }

    /// Exclude one tool by its server and original name
    pub fn without_origin(mut self, server: impl Into<String>, tool: impl Into<String>) -> Self {
        self.exclude_origin.insert((server.into(), tool.into()));
        self
    }

    /// Check if a tool matches this filter
    pub fn matches(&self, tool: &NormalizedToolHandle) -> bool {
        if self.exclude.contains(tool.qualified_name()) {
            return false;
        }

        if self
            .exclude_origin
            .contains(&(tool.server_id().to_string(), tool.origin_name().to_string()))
        {
            return false;
        }

        if let Some(ref servers) = self.servers {
            if !servers.contains(tool.server_id()) {
                return false;
            }
        }

        if let Some(ref include) = self.include {
            if !include.contains(tool.qualified_name()) {
                return false;
            }
        }

        true
    }

    pub fn apply(
        &self,
        tools: BTreeMap<String, NormalizedToolHandle>,
    ) -> BTreeMap<String, NormalizedToolHandle> {
        tools.into_iter().filter(|(_, t)| self.matches(t)).collect()
    }
}

/// Something the user referenced in a chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mention {
    /// A whole server
    #[serde(rename_all = "camelCase")]
    McpServer { server_id: String },
    /// One tool on a server, by its original name
    #[serde(rename_all = "camelCase")]
    Tool { server_id: String, name: String },
}

/// Restrict tools to what the message mentions
///
/// A server mention admits all of that server's tools; a tool mention admits
/// that tool. Without any mentions everything passes.
pub fn filter_by_mentions(
    tools: BTreeMap<String, NormalizedToolHandle>,
    mentions: &[Mention],
) -> BTreeMap<String, NormalizedToolHandle> {
    if mentions.is_empty() {
        return tools;
    }

    let mut whole_servers = HashSet::new();
    let mut named: HashMap<&str, HashSet<&str>> = HashMap::new();
    for mention in mentions {
        match mention {
            Mention::McpServer { server_id } => {
                whole_servers.insert(server_id.as_str());
            }
            Mention::Tool { server_id, name } => {
                named.entry(server_id.as_str()).or_default().insert(name.as_str());
            }
        }
    }

    tools
        .into_iter()
        .filter(|(_, tool)| {
            whole_servers.contains(tool.server_id())
                || named
                    .get(tool.server_id())
                    .map(|names| names.contains(tool.origin_name()))
                    .unwrap_or(false)
        })
        .collect()
}

/// Per-server allow-list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedServer {
    /// Original tool names; `None` allows every tool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

/// Restrict tools to the allowed servers' tool lists
///
/// Servers without an entry, or whose entry has no tool list, are not
/// restricted.
pub fn filter_by_allowed_servers(
    tools: BTreeMap<String, NormalizedToolHandle>,
    allowed: &BTreeMap<String, AllowedServer>,
) -> BTreeMap<String, NormalizedToolHandle> {
    tools
        .into_iter()
        .filter(|(_, tool)| match allowed.get(tool.server_id()).and_then(|a| a.tools.as_ref()) {
            Some(names) => names.iter().any(|n| n == tool.origin_name()),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handle::build_catalogue;
    use crate::types::ToolDescriptor;
    use std::sync::Weak;

    fn catalogue() -> BTreeMap<String, NormalizedToolHandle> {
        let servers: BTreeMap<String, Vec<ToolDescriptor>> = [
            ("github", vec!["search", "create_issue"]),
            ("weather", vec!["forecast"]),
        ]
        .into_iter()
        .map(|(s, tools)| (s.to_string(), tools.into_iter().map(ToolDescriptor::new).collect()))
        .collect();
        build_catalogue(&servers, &Weak::new())
    }

    fn names(tools: &BTreeMap<String, NormalizedToolHandle>) -> Vec<&str> {
        tools.keys().map(String::as_str).collect()
    }

    #[test]
    fn test_tool_filter() {
        let all = ToolFilter::new().apply(catalogue());
        assert_eq!(all.len(), 3);

        let filtered = ToolFilter::new()
            .with_servers(["github".to_string()])
            .without_origin("github", "create_issue")
            .apply(catalogue());
        assert_eq!(names(&filtered), vec!["github_search"]);

        let filtered = ToolFilter::new()
            .with_include(["weather_forecast".to_string(), "github_search".to_string()])
            .with_exclude(["github_search".to_string()])
            .apply(catalogue());
        assert_eq!(names(&filtered), vec!["weather_forecast"]);
    }

    #[test]
    fn test_filter_by_mentions() {
        assert_eq!(filter_by_mentions(catalogue(), &[]).len(), 3);

        let mentions = vec![
            Mention::McpServer {
                server_id: "weather".into(),
            },
            Mention::Tool {
                server_id: "github".into(),
                name: "search".into(),
            },
        ];
        let filtered = filter_by_mentions(catalogue(), &mentions);
        assert_eq!(names(&filtered), vec!["github_search", "weather_forecast"]);
    }

    #[test]
    fn test_mention_wire_shape() {
        let mention: Mention = serde_json::from_str(
            r#"{"type": "tool", "serverId": "github", "name": "search"}"#,
        )
        .unwrap();
        assert_eq!(
            mention,
            Mention::Tool {
                server_id: "github".into(),
                name: "search".into()
            }
        );

        let mention: Mention =
            serde_json::from_str(r#"{"type": "mcpServer", "serverId": "weather"}"#).unwrap();
        assert!(matches!(mention, Mention::McpServer { .. }));
    }

    #[test]
    fn test_filter_by_allowed_servers() {
        let mut allowed = BTreeMap::new();
        allowed.insert(
            "github".to_string(),
            AllowedServer {
                tools: Some(vec!["create_issue".to_string()]),
            },
        );
        allowed.insert("weather".to_string(), AllowedServer { tools: None });

        let filtered = filter_by_allowed_servers(catalogue(), &allowed);
        assert_eq!(names(&filtered), vec!["github_create_issue", "weather_forecast"]);

        let filtered = filter_by_allowed_servers(catalogue(), &BTreeMap::new());
        assert_eq!(filtered.len(), 3);
    }
}
