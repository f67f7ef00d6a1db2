//! Core types shared across the connection manager
//!
//! Server descriptors, tool descriptors, call results and cancellation.

mod cancellation;
mod server;
mod tool;

pub use cancellation::CancellationToken;
pub use server::{
    entries_to_server_set, merge_environment, HttpConfig, Protocol, ServerDescriptor,
    ServerEntry, ServerSet, ServerTransport, StdioConfig,
};
pub use tool::{CallResult, ToolDescriptor};
