//! Tool call supports.

mod error;
mod manager;
mod object;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use manager::Manager;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A tool with a typed input, known at compile time.
///
/// Implementations should keep no per-call state. Anything a call needs,
/// such as an HTTP client or an endpoint, is an immutable part of the tool
/// and is cloned into the returned future.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}

/// A tool whose shape is only known at run time, such as one exported by
/// an MCP server.
///
/// Arguments are passed through as raw JSON. Validating them is up to the
/// implementation.
#[async_trait]
pub trait DynamicTool: Send + Sync + 'static {
    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Calls the tool with raw arguments.
    async fn call(&self, arguments: Value) -> ToolResult;
}
