use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use serde_json::{Value, json};
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::{ChatCompletionChunk, Delta};

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn into_request(self) -> ToolCallRequest {
        let arguments = if self.arguments.trim().is_empty() {
            json!({})
        } else {
            // Let the tool reject malformed arguments instead of failing
            // the whole response.
            serde_json::from_str::<Value>(&self.arguments)
                .unwrap_or_else(|_| json!({ "__raw": self.arguments }))
        };
        ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

struct StreamState {
    sse: Sse,
    id: Option<String>,
    // Keyed by the `index` the server assigns, which also gives the order
    // tool calls are reported in.
    tool_calls: BTreeMap<u32, PartialToolCall>,
    ready_events: VecDeque<ModelResponseEvent>,
    finished: bool,
}

impl StreamState {
    fn apply_chunk(&mut self, data: &str) -> Result<(), Error> {
        let chunk = serde_json::from_str::<ChatCompletionChunk>(data)
            .map_err(|err| Error::new(format!("bad chunk: {err}"), ErrorKind::Other))?;
        if let Some(chunk_id) = chunk.id.filter(|id| !id.is_empty()) {
            match &self.id {
                Some(id) if *id != chunk_id => {
                    return Err(Error::new(
                        "chunk id mismatch",
                        ErrorKind::Other,
                    ));
                }
                Some(_) => {}
                None => self.id = Some(chunk_id),
            }
        }

        // Some servers put the finish reason in the same chunk as the last
        // delta, so the delta is always applied first.
        for choice in chunk.choices {
            self.apply_delta(choice.delta);
            if let Some(reason) = choice.finish_reason {
                self.finish(Some(&reason));
            }
        }
        Ok(())
    }

    fn apply_delta(&mut self, delta: Delta) {
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            self.ready_events
                .push_back(ModelResponseEvent::MessageDelta(content));
        }
        for (pos, fragment) in delta.tool_calls.into_iter().flatten().enumerate()
        {
            let index = fragment.index.unwrap_or(pos as u32);
            let partial = self.tool_calls.entry(index).or_default();
            if let Some(id) = fragment.id {
                partial.id.push_str(&id);
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name {
                    partial.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    partial.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn finish(&mut self, reason: Option<&str>) {
        if self.finished {
            return;
        }
        self.finished = true;

        let has_tool_calls = !self.tool_calls.is_empty();
        for (_, partial) in std::mem::take(&mut self.tool_calls) {
            self.ready_events
                .push_back(ModelResponseEvent::ToolCall(partial.into_request()));
        }
        let reason = match reason {
            Some("tool_calls") => ModelFinishReason::ToolCalls,
            Some("length") => ModelFinishReason::Length,
            _ if has_tool_calls => ModelFinishReason::ToolCalls,
            _ => ModelFinishReason::Stop,
        };
        self.ready_events
            .push_back(ModelResponseEvent::Completed(reason));
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, StreamState), Error>;

pin_project! {
    /// A streamed chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let state = StreamState {
            sse,
            id: None,
            tool_calls: BTreeMap::new(),
            ready_events: VecDeque::new(),
            finished: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(state))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut.as_mut() else {
            return Poll::Ready(Ok(None));
        };
        let result = ready!(next_event_fut.as_mut().poll(cx));
        *this.next_event_fut = None;
        match result {
            Ok((Some(event), state)) => {
                *this.next_event_fut = Some(Box::pin(next_event(state)));
                Poll::Ready(Ok(Some(event)))
            }
            Ok((None, _)) => Poll::Ready(Ok(None)),
            Err(err) => Poll::Ready(Err(err)),
        }
    }
}

async fn next_event(mut state: StreamState) -> NextEvent {
    loop {
        if let Some(event) = state.ready_events.pop_front() {
            return Ok((Some(event), state));
        }
        if state.finished {
            return Ok((None, state));
        }

        match state.sse.next_event().await {
            Ok(Some(data)) if data.trim() == "[DONE]" => state.finish(None),
            Ok(Some(data)) => {
                trace!("got sse event: {data}");
                state.apply_chunk(&data)?;
            }
            Ok(None) => state.finish(None),
            Err(err @ SseError::Chunks(_)) => {
                return Err(Error::new(err.to_string(), ErrorKind::Transient));
            }
            Err(err) => {
                return Err(Error::new(err.to_string(), ErrorKind::Other));
            }
        }
    }
}
