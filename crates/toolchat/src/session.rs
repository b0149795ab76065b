use std::sync::Arc;

use toolchat_core::conversation::Item as ConversationItem;
use toolchat_core::{Agent, AgentBuilder, AgentError, DynamicTool, RetryPolicy};
use toolchat_mcp::McpClient;
use toolchat_model::{ModelProvider, ToolCallRequest};

use crate::tools::*;

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    web_tools: Option<WebToolsConfig>,
    mcp_client: Option<Arc<McpClient>>,
    extra_tools: Vec<Arc<dyn DynamicTool>>,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    ///
    /// The web tools are enabled with their default config.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        Self {
            agent_builder: AgentBuilder::with_model_provider(provider),
            web_tools: Some(WebToolsConfig::default()),
            mcp_client: None,
            extra_tools: vec![],
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Limits how many model calls one message may take.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_steps(max_steps);
        self
    }

    /// Keeps the conversation between messages when `true` (the default).
    #[inline]
    pub fn with_memory(mut self, memory: bool) -> Self {
        self.agent_builder = self.agent_builder.with_memory(memory);
        self
    }

    /// Sets how failed model requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.agent_builder = self.agent_builder.with_retry_policy(retry_policy);
        self
    }

    /// Uses `config` for the web tools.
    #[inline]
    pub fn with_web_tools(mut self, config: WebToolsConfig) -> Self {
        self.web_tools = Some(config);
        self
    }

    /// Leaves the web tools out.
    #[inline]
    pub fn without_web_tools(mut self) -> Self {
        self.web_tools = None;
        self
    }

    /// Offers the tools of `mcp_client`'s open sessions to the model.
    ///
    /// Sessions should be created before [`build`](Self::build), which
    /// snapshots the tool list. The session closes the client on
    /// [`Session::close`].
    #[inline]
    pub fn with_mcp_client(mut self, mcp_client: Arc<McpClient>) -> Self {
        self.mcp_client = Some(mcp_client);
        self
    }

    /// Offers a tool provided by the host app.
    #[inline]
    pub fn with_dynamic_tool(mut self, tool: Arc<dyn DynamicTool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_transcript(on_transcript);
        self
    }

    /// Attaches a callback to be invoked when the model calls a tool.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_tool_call(on_tool_call);
        self
    }

    /// Builds a new session.
    ///
    /// Dynamic tools, from the host app or the MCP client, are registered
    /// after the built-in ones, so they win over a built-in tool with the
    /// same name.
    pub async fn build(self) -> Session {
        let mut agent_builder = self.agent_builder;
        if let Some(config) = self.web_tools {
            agent_builder = agent_builder
                .with_tool(WebSearchTool::new(config.clone()))
                .with_tool(FetchPageTool::new(config.clone()))
                .with_tool(WeatherTool::new(config));
        }
        let mut dynamic_tools = self.extra_tools;
        if let Some(mcp_client) = &self.mcp_client {
            for tool in mcp_client.tools().await {
                dynamic_tools.push(tool);
            }
        }
        for tool in dynamic_tools {
            agent_builder = agent_builder.with_dynamic_tool(tool);
        }

        Session {
            agent: agent_builder.build(),
            mcp_client: self.mcp_client,
        }
    }
}

/// A chat session, like a window that displays messages and has a input box.
///
/// The session holds a fully configured agent that you can use directly, and
/// it is basically a wrapper around [`Agent`].
pub struct Session {
    agent: Agent,
    mcp_client: Option<Arc<McpClient>>,
}

impl Session {
    /// Sends a message and waits for the assistant's answer.
    #[inline]
    pub async fn send_message(&self, message: &str) -> Result<String, AgentError> {
        self.agent.run(message).await
    }

    /// Forgets the conversation so far.
    #[inline]
    pub async fn clear_history(&self) -> Result<(), AgentError> {
        self.agent.clear_history().await
    }

    /// Returns the conversation so far.
    #[inline]
    pub async fn history(&self) -> Result<Vec<ConversationItem>, AgentError> {
        self.agent.history().await
    }

    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Closes the MCP sessions, if any. The chat itself keeps working, but
    /// MCP tools fail from now on.
    pub async fn close(&self) {
        if let Some(mcp_client) = &self.mcp_client {
            mcp_client.close_all_sessions().await;
        }
    }
}
