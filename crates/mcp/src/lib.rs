//! Tools served by Model Context Protocol servers.
//!
//! Servers are listed in a JSON config file and started as child processes
//! that speak MCP over stdio. Their tools are exposed to the agent as
//! [`DynamicTool`](toolchat_core::DynamicTool)s.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod client;
mod config;
mod error;
mod tool;

pub use client::McpClient;
pub use config::{McpConfig, McpServerConfig};
pub use error::Error;
pub use tool::McpTool;
