use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolchat_model::{ModelMessage, ModelRequest, ModelTool, ToolCallRequest};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionCall {
    name: String,
    // The API expects the arguments as a JSON-encoded string.
    arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct ToolCall {
    id: String,
    r#type: &'static str,
    function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub(crate) enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        temperature: config.temperature,
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(assistant) => Message::Assistant {
            content: if assistant.content.is_empty()
                && !assistant.tool_calls.is_empty()
            {
                None
            } else {
                Some(assistant.content.clone())
            },
            tool_calls: assistant.tool_calls.iter().map(create_tool_call).collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
    }
}

fn create_tool_call(req: &ToolCallRequest) -> ToolCall {
    ToolCall {
        id: req.id.clone(),
        r#type: "function",
        function: FunctionCall {
            name: req.name.clone(),
            arguments: req.arguments.to_string(),
        },
    }
}

fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use toolchat_model::{AssistantMessage, ToolCallResult};

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::User("Hello".to_owned()),
            ],
            tools: vec![ModelTool {
                name: "weather".to_owned(),
                description: "Current weather for a place.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": { "location": { "type": "string" } }
                }),
            }],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .with_temperature(Some(0.5))
            .build();

        let body = serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "messages": [
                    { "role": "system", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "Hello" }
                ],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "weather",
                        "description": "Current weather for a place.",
                        "parameters": {
                            "type": "object",
                            "properties": { "location": { "type": "string" } }
                        }
                    }
                }],
                "temperature": 0.5,
                "stream": true
            })
        );
    }

    #[test]
    fn test_tool_call_history() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::User("Weather in Oslo?".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    content: String::new(),
                    tool_calls: vec![ToolCallRequest {
                        id: "call_1".to_owned(),
                        name: "weather".to_owned(),
                        arguments: json!({ "location": "Oslo" }),
                    }],
                }),
                ModelMessage::Tool(ToolCallResult {
                    id: "call_1".to_owned(),
                    content: "Clear sky, 4 °C".to_owned(),
                }),
                ModelMessage::Assistant(AssistantMessage::text("It is clear.")),
            ],
            tools: vec![],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_temperature(None)
            .build();

        let body = serde_json::to_value(create_request(&request, &config)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());
        assert_eq!(
            body["messages"][1],
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "weather",
                        "arguments": "{\"location\":\"Oslo\"}"
                    }
                }]
            })
        );
        assert_eq!(
            body["messages"][2],
            json!({
                "role": "tool",
                "tool_call_id": "call_1",
                "content": "Clear sky, 4 °C"
            })
        );
        assert_eq!(
            body["messages"][3],
            json!({ "role": "assistant", "content": "It is clear." })
        );
    }
}
