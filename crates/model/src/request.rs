use serde_json::Value;

use crate::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A message previously produced by the model.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
}

/// A message produced by the model, possibly requesting tool calls.
///
/// Providers that require the tool call requests to be echoed back in
/// the history (most of them do) can rebuild them from `tool_calls`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssistantMessage {
    /// The text content, empty if the model only called tools.
    pub content: String,
    /// Tool calls requested in this message.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn text<S: Into<String>>(content: S) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
        }
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The identifier of the tool call request this answers.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
