mod builder;
mod state;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use toolchat_actor::{Actor, Reply};
use toolchat_model::{ErrorKind, ToolCallRequest};
use tokio::task::JoinHandle;

use crate::conversation::{Conversation, Item as ConversationItem};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::Manager as ToolManager;
pub use builder::AgentBuilder;
use state::{ClearHistory, GetHistory, PendingInput, RunTurn, Turn};

pub(crate) type TranscriptCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type ToolCallCallback = Arc<dyn Fn(&ToolCallRequest) + Send + Sync>;
pub(crate) type IdleCallback = Box<dyn Fn() + Send + Sync>;

/// The reason a turn failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The model request failed, after retries if the error allowed them.
    #[error("model request failed: {message}")]
    Model {
        /// The kind reported by the model provider.
        kind: ErrorKind,
        /// The provider's error message.
        message: String,
    },
    /// The model kept calling tools until the step limit was reached.
    #[error("stopped after {0} model calls without a final answer")]
    MaxStepsReached(usize),
    /// The agent task is gone.
    #[error("the agent is no longer running")]
    Terminated,
}

/// A chat agent, which owns a conversation, a model client and a toolset.
///
/// The agent runs as an actor. Every method only posts a message to it,
/// so the agent keeps accepting inputs while the model is thinking or
/// tools are running. Inputs that arrive during a turn are queued and
/// handled in order once the turn ends.
///
/// Dropping every clone of the handle stops the agent.
#[derive(Clone)]
pub struct Agent {
    actor: Actor<AgentState>,
}

impl Agent {
    /// Runs one turn with `input` and returns the final answer.
    pub async fn run<S: Into<String>>(
        &self,
        input: S,
    ) -> Result<String, AgentError> {
        let input = input.into();
        self.actor
            .ask(|reply| RunTurn {
                input,
                reply: Some(reply),
            })
            .await
            .map_err(|_| AgentError::Terminated)?
    }

    /// Enqueues a user input without waiting for the answer.
    ///
    /// The answer is only observable through the callbacks.
    pub fn enqueue_user_input<S: Into<String>>(
        &self,
        input: S,
    ) -> Result<(), AgentError> {
        self.actor
            .send(RunTurn {
                input: input.into(),
                reply: None,
            })
            .map_err(|_| AgentError::Terminated)
    }

    /// Forgets the conversation.
    ///
    /// If a turn is running, the clear is queued behind the inputs sent
    /// before it, so those inputs still see the old conversation. This
    /// method waits until the clear is applied.
    pub async fn clear_history(&self) -> Result<(), AgentError> {
        self.actor
            .ask(ClearHistory)
            .await
            .map_err(|_| AgentError::Terminated)
    }

    /// Returns a snapshot of the conversation.
    pub async fn history(&self) -> Result<Vec<ConversationItem>, AgentError> {
        self.actor
            .ask(GetHistory)
            .await
            .map_err(|_| AgentError::Terminated)
    }

    fn spawn_from_builder(builder: AgentBuilder) -> Self {
        let AgentBuilder {
            model_client,
            system_prompt,
            max_steps,
            memory,
            retry_policy,
            tools,
            on_transcript,
            on_tool_call,
            on_idle,
        } = builder;

        let state = AgentState {
            model_client,
            tools: Arc::new(tools),
            system_prompt,
            max_steps,
            memory,
            retry_policy,
            conversation: Default::default(),
            current_turn: None,
            next_turn_id: 1,
            pending_inputs: Default::default(),
            running_tasks: Default::default(),
            next_task_id: 1,
            on_transcript,
            on_tool_call,
            on_idle,
        };
        Self {
            actor: Actor::spawn(state, Some("agent")),
        }
    }
}

pub(crate) struct AgentState {
    model_client: ModelClient,
    tools: Arc<ToolManager>,
    system_prompt: Option<String>,
    max_steps: usize,
    memory: bool,
    retry_policy: RetryPolicy,

    conversation: Conversation,
    current_turn: Option<Turn>,
    next_turn_id: u64,
    /// Inputs and clears that arrived during a turn, in send order.
    pending_inputs: VecDeque<PendingInput>,
    running_tasks: HashMap<u64, JoinHandle<()>>,
    next_task_id: u64,

    on_transcript: Option<TranscriptCallback>,
    on_tool_call: Option<ToolCallCallback>,
    on_idle: Option<IdleCallback>,
}
