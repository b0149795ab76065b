//! Core logic of the chat agent: the turn loop, conversation memory, model
//! retries and tool dispatch.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentError};
pub use model_client::RetryPolicy;
pub use tool::{DynamicTool, Tool, ToolResult};
