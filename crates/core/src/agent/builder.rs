use std::sync::Arc;

use toolchat_model::{ModelProvider, ToolCallRequest};

use super::{Agent, IdleCallback, ToolCallCallback, TranscriptCallback};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{DynamicTool, Manager as ToolManager, Tool};

const DEFAULT_MAX_STEPS: usize = 15;

/// [`Agent`] builder.
pub struct AgentBuilder {
    pub(crate) model_client: ModelClient,
    pub(crate) system_prompt: Option<String>,
    pub(crate) max_steps: usize,
    pub(crate) memory: bool,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) tools: ToolManager,
    pub(crate) on_transcript: Option<TranscriptCallback>,
    pub(crate) on_tool_call: Option<ToolCallCallback>,
    pub(crate) on_idle: Option<IdleCallback>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            memory: true,
            retry_policy: RetryPolicy::default(),
            tools: ToolManager::default(),
            on_transcript: None,
            on_tool_call: None,
            on_idle: None,
        }
    }

    /// Sets the system prompt sent ahead of the conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Limits how many model calls one turn may make. Clamped to at
    /// least 1.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Keeps the conversation across turns when `true` (the default).
    /// Otherwise every turn starts from an empty conversation.
    #[inline]
    pub fn with_memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    /// Sets how failed model requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Registers a tool discovered at run time.
    #[inline]
    pub fn with_dynamic_tool(mut self, tool: Arc<dyn DynamicTool>) -> Self {
        self.tools.add_dynamic_tool(tool);
        self
    }

    /// Attaches a callback receiving the model's text as it streams in.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback invoked right before each tool call starts.
    #[inline]
    pub fn on_tool_call(
        mut self,
        on_tool_call: impl Fn(&ToolCallRequest) + Send + Sync + 'static,
    ) -> Self {
        self.on_tool_call = Some(Arc::new(on_tool_call));
        self
    }

    /// Attaches a callback to be invoked when the agent is idle.
    #[inline]
    pub fn on_idle(
        mut self,
        on_idle: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.on_idle = Some(Box::new(on_idle));
        self
    }

    /// Builds the agent.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    #[inline]
    pub fn build(self) -> Agent {
        Agent::spawn_from_builder(self)
    }
}
