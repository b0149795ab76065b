use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult, Content, RawContent};
use rmcp::service::{Peer, RoleClient};
use serde_json::{Map, Value};
use toolchat_core::tool::{Error as ToolError, ToolResult};
use toolchat_core::DynamicTool;

/// A tool exported by an MCP server.
///
/// Calls are forwarded to the server session the tool was listed from.
/// Once that session is closed, calls fail with an execution error.
#[derive(Clone)]
pub struct McpTool {
    server: String,
    name: String,
    description: String,
    schema: Value,
    peer: Peer<RoleClient>,
}

impl McpTool {
    pub(crate) fn new(
        server: &str,
        tool: &rmcp::model::Tool,
        peer: Peer<RoleClient>,
    ) -> Self {
        Self {
            server: server.to_owned(),
            name: tool.name.to_string(),
            description: tool
                .description
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            schema: Value::Object((*tool.input_schema).clone()),
            peer,
        }
    }

    /// Returns the name of the server that exports this tool.
    #[inline]
    pub fn server(&self) -> &str {
        &self.server
    }
}

#[async_trait]
impl DynamicTool for McpTool {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    async fn call(&self, arguments: Value) -> ToolResult {
        let arguments = into_arguments(arguments)?;
        trace!(server = %self.server, tool = %self.name, "calling mcp tool");
        let mut params = CallToolRequestParams::new(self.name.clone());
        params.arguments = arguments;
        match self.peer.call_tool(params).await {
            Ok(result) => render_result(result),
            Err(err) => {
                warn!(server = %self.server, "mcp call failed: {err}");
                Err(ToolError::execution_error()
                    .with_reason(format!("MCP call failed: {err}")))
            }
        }
    }
}

fn into_arguments(arguments: Value) -> Result<Option<Map<String, Value>>, ToolError> {
    match arguments {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        other => Err(ToolError::invalid_input()
            .with_reason(format!("expected an object of arguments, got {other}"))),
    }
}

fn extract_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_result(result: CallToolResult) -> ToolResult {
    let text = extract_text(&result.content);
    if result.is_error == Some(true) {
        Err(ToolError::execution_error().with_reason(text))
    } else {
        Ok(text)
    }
}
