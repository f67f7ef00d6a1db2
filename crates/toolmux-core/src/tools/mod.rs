//! Tool catalogue
//!
//! `McpManager::tools()` turns every connected server's tool list into
//! [`NormalizedToolHandle`]s keyed by qualified name (`server_tool`). The
//! filters here narrow such a snapshot for one chat turn.

mod filter;
mod handle;

pub(crate) use handle::build_catalogue;
pub use filter::{filter_by_allowed_servers, filter_by_mentions, AllowedServer, Mention, ToolFilter};
pub use handle::{qualified_name, sanitize_name, NormalizedToolHandle};
