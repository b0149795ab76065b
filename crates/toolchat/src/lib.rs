//! A terminal chat assistant that lets a model use web tools and MCP
//! servers.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the same chat session into your own host
//! apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod session;
pub mod tools;

pub use session::{Session, SessionBuilder};

/// The system prompt used by the CLI. `{{HOST_OS}}` is left for the host to
/// fill in.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("system_prompt.md");

/// Re-exports of [`toolchat_core`] crate.
pub mod core {
    pub use toolchat_core::*;
}

/// Re-exports of [`toolchat_mcp`] crate.
pub mod mcp {
    pub use toolchat_mcp::*;
}
