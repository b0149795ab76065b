use std::fmt::{self, Debug};
use std::mem;

use toolchat_actor::{Actor, Message, Reply};
use toolchat_model::{
    AssistantMessage, ModelMessage, ModelProviderError, ModelRequest,
    ToolCallRequest, ToolCallResult,
};

use super::{AgentError, AgentState};
use crate::conversation::Item as ConversationItem;
use crate::model_client::ModelClientResponse;
use crate::tool::{Error as ToolError, ToolResult};

type TurnReply = Reply<Result<String, AgentError>>;

/// Work that waits for the running turn to end.
pub enum PendingInput {
    Turn(String, Option<TurnReply>),
    Clear(Reply<()>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStage {
    ModelThinking,
    RunningTools,
}

/// Bookkeeping for the turn in progress.
pub struct Turn {
    id: u64,
    reply: Option<TurnReply>,
    stage: AgentStage,
    /// Conversation length before the user input, restored on failure.
    rollback_len: usize,
    steps: usize,
    tool_calls: Vec<ToolCallRequest>,
    tool_results: Vec<Option<ToolResult>>,
}

impl AgentState {
    fn enqueue_user_input(
        &mut self,
        input: String,
        reply: Option<TurnReply>,
        handle: &Actor<Self>,
    ) {
        if self.current_turn.is_some() {
            // Picked up again when the running turn ends.
            self.pending_inputs
                .push_back(PendingInput::Turn(input, reply));
            return;
        }
        self.start_turn(input, reply, handle);
    }

    fn process_next_input(&mut self, handle: &Actor<Self>) {
        debug_assert!(self.current_turn.is_none());
        while let Some(pending) = self.pending_inputs.pop_front() {
            match pending {
                PendingInput::Turn(input, reply) => {
                    self.start_turn(input, reply, handle);
                    return;
                }
                PendingInput::Clear(reply) => {
                    self.conversation.clear();
                    reply.send(());
                }
            }
        }
        if let Some(on_idle) = &self.on_idle {
            on_idle();
        }
    }

    fn start_turn(
        &mut self,
        input: String,
        reply: Option<TurnReply>,
        handle: &Actor<Self>,
    ) {
        if !self.memory {
            self.conversation.clear();
        }

        let id = self.next_turn_id;
        self.next_turn_id += 1;
        debug!(turn = id, "starting a turn");

        self.current_turn = Some(Turn {
            id,
            reply,
            stage: AgentStage::ModelThinking,
            rollback_len: self.conversation.len(),
            steps: 0,
            tool_calls: vec![],
            tool_results: vec![],
        });
        self.conversation
            .push(ModelMessage::User(input.clone()), input);
        self.call_model(handle);
    }

    fn call_model(&mut self, handle: &Actor<Self>) {
        let max_steps = self.max_steps;
        let Some(turn) = self.current_turn.as_mut() else {
            return;
        };
        if turn.steps >= max_steps {
            warn!(turn = turn.id, "step limit reached");
            self.finish_turn(Err(AgentError::MaxStepsReached(max_steps)), handle);
            return;
        }
        turn.steps += 1;
        turn.stage = AgentStage::ModelThinking;
        let turn_id = turn.id;

        let request = self.build_model_request();
        let model_client = self.model_client.clone();
        let retry_policy = self.retry_policy;
        let on_transcript = self.on_transcript.clone();
        let handle_clone = handle.clone();
        self.spawn_task(
            async move {
                let response = model_client
                    .send_request(request, retry_policy, move |delta| {
                        if let Some(on_transcript) = &on_transcript {
                            on_transcript(&delta);
                        }
                    })
                    .await;
                handle_clone
                    .send(ModelRequestFinished { turn_id, response })
                    .ok();
            },
            handle,
        );
    }

    fn build_model_request(&self) -> ModelRequest {
        let system = self
            .system_prompt
            .iter()
            .map(|prompt| ModelMessage::System(prompt.clone()));
        ModelRequest {
            messages: system
                .chain(self.conversation.messages().cloned())
                .collect(),
            tools: self.tools.definitions(),
        }
    }

    fn handle_model_response(
        &mut self,
        response: ModelClientResponse,
        handle: &Actor<Self>,
    ) {
        let ModelClientResponse {
            transcript,
            tool_calls,
            finish_reason,
        } = response;
        trace!("model finished with {finish_reason:?}");

        let msg = ModelMessage::Assistant(AssistantMessage {
            content: transcript.clone(),
            tool_calls: tool_calls.clone(),
        });
        self.conversation.push(msg, transcript.clone());

        if tool_calls.is_empty() {
            self.finish_turn(Ok(transcript), handle);
            return;
        }

        let Some(turn) = self.current_turn.as_mut() else {
            return;
        };
        turn.stage = AgentStage::RunningTools;
        turn.tool_results = vec![None; tool_calls.len()];
        let turn_id = turn.id;

        if let Some(on_tool_call) = &self.on_tool_call {
            tool_calls.iter().for_each(|req| on_tool_call(req));
        }

        let tools = std::sync::Arc::clone(&self.tools);
        let mut spawned = vec![];
        tools.handle_requests(&tool_calls, |index, fut| {
            spawned.push((index, fut));
        });
        for (index, fut) in spawned {
            let handle_clone = handle.clone();
            self.spawn_task(
                async move {
                    // A panicking tool must still answer its call id.
                    let result = match tokio::spawn(fut).await {
                        Ok(result) => result,
                        Err(err) => {
                            error!("tool task failed: {err}");
                            Err(ToolError::execution_error()
                                .with_reason("tool panicked"))
                        }
                    };
                    handle_clone
                        .send(ToolCallFinished {
                            turn_id,
                            index,
                            result,
                        })
                        .ok();
                },
                handle,
            );
        }
        if let Some(turn) = self.current_turn.as_mut() {
            turn.tool_calls = tool_calls;
        }
    }

    fn handle_tool_result(
        &mut self,
        index: usize,
        result: ToolResult,
        handle: &Actor<Self>,
    ) {
        let Some(turn) = self.current_turn.as_mut() else {
            return;
        };
        let Some(slot) = turn.tool_results.get_mut(index) else {
            return;
        };
        *slot = Some(result);
        if turn.tool_results.iter().any(Option::is_none) {
            return;
        }

        // Every call has answered, feed the results back in request order.
        let tool_calls = mem::take(&mut turn.tool_calls);
        let results = mem::take(&mut turn.tool_results);
        for (req, result) in tool_calls.into_iter().zip(results.into_iter().flatten()) {
            let content = match result {
                Ok(output) => output,
                Err(err) => {
                    debug!("tool `{}` failed: {err}", req.name);
                    format!("Error: {}", err.reason())
                }
            };
            self.conversation.push(
                ModelMessage::Tool(ToolCallResult {
                    id: req.id,
                    content: content.clone(),
                }),
                content,
            );
        }
        self.call_model(handle);
    }

    fn finish_turn(
        &mut self,
        result: Result<String, AgentError>,
        handle: &Actor<Self>,
    ) {
        let Some(turn) = self.current_turn.take() else {
            return;
        };
        match &result {
            Ok(_) => debug!(turn = turn.id, steps = turn.steps, "turn finished"),
            Err(err) => {
                warn!(turn = turn.id, "turn failed: {err}");
                self.conversation.truncate(turn.rollback_len);
            }
        }
        if let Some(reply) = turn.reply {
            reply.send(result);
        }
        self.process_next_input(handle);
    }

    fn spawn_task<Fut>(&mut self, fut: Fut, handle: &Actor<Self>)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_id = self.next_task_id;
        self.next_task_id += 1;

        let handle = handle.clone();
        let task = tokio::spawn(async move {
            fut.await;
            handle.send(TaskEnded(task_id)).ok();
        });
        self.running_tasks.insert(task_id, task);
    }
}

#[derive(Debug)]
pub struct RunTurn {
    pub input: String,
    pub reply: Option<TurnReply>,
}

impl Message<AgentState> for RunTurn {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        state.enqueue_user_input(self.input, self.reply, handle);
    }
}

#[derive(Debug)]
pub struct ClearHistory(pub Reply<()>);

impl Message<AgentState> for ClearHistory {
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        if state.current_turn.is_some() {
            state.pending_inputs.push_back(PendingInput::Clear(self.0));
            return;
        }
        state.conversation.clear();
        self.0.send(());
    }
}

#[derive(Debug)]
pub struct GetHistory(pub Reply<Vec<ConversationItem>>);

impl Message<AgentState> for GetHistory {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        self.0.send(state.conversation.items().to_vec());
    }
}

struct ModelRequestFinished {
    turn_id: u64,
    response: Result<ModelClientResponse, Box<dyn ModelProviderError>>,
}

impl Debug for ModelRequestFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRequestFinished")
            .field("turn_id", &self.turn_id)
            .field("response", &self.response)
            .finish()
    }
}

impl Message<AgentState> for ModelRequestFinished {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        let is_current = state.current_turn.as_ref().is_some_and(|turn| {
            turn.id == self.turn_id && turn.stage == AgentStage::ModelThinking
        });
        if !is_current {
            debug!(turn = self.turn_id, "dropping a stale model response");
            return;
        }

        match self.response {
            Ok(response) => state.handle_model_response(response, handle),
            Err(err) => {
                let err = AgentError::Model {
                    kind: err.kind(),
                    message: err.to_string(),
                };
                state.finish_turn(Err(err), handle);
            }
        }
    }
}

#[derive(Debug)]
struct ToolCallFinished {
    turn_id: u64,
    index: usize,
    result: ToolResult,
}

impl Message<AgentState> for ToolCallFinished {
    fn handle(self, state: &mut AgentState, handle: &Actor<AgentState>) {
        let is_current = state.current_turn.as_ref().is_some_and(|turn| {
            turn.id == self.turn_id && turn.stage == AgentStage::RunningTools
        });
        if !is_current {
            debug!(turn = self.turn_id, "dropping a stale tool result");
            return;
        }
        state.handle_tool_result(self.index, self.result, handle);
    }
}

#[derive(Debug)]
struct TaskEnded(u64);

impl Message<AgentState> for TaskEnded {
    #[inline]
    fn handle(self, state: &mut AgentState, _handle: &Actor<AgentState>) {
        if state.running_tasks.remove(&self.0).is_none() {
            warn!("task {} ended twice", self.0);
        }
    }
}
