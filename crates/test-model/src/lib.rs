//! A scripted fake model for tests.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::time::{Sleep, sleep};
use toolchat_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();
        if let Some(delay) = this.delay {
            let sleep = this.sleep.get_or_insert_with(|| Box::pin(sleep(delay)));
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
        }
        Poll::Ready(Ok(this.events.pop_front()))
    }
}

#[derive(Default)]
struct Script {
    responses: Vec<PresetResponse>,
    next_response: usize,
    failed_attempts: u64,
    requests: Vec<ModelRequest>,
}

/// A fake model that answers requests from a fixed script.
///
/// Each request consumes the next [`PresetResponse`], regardless of what
/// the request contains. Running past the end of the script is an error.
/// Clones share the script and its progress, so a test can keep a clone
/// to inspect the requests after handing the provider to an agent.
///
/// # Note
///
/// Requests are recorded in full. Only use this type for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        self.lock().responses.push(preset);
    }

    /// Delays every event by `duration`.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns the requests sent so far, including failed attempts.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns how many scripted responses are still unused.
    pub fn remaining(&self) -> usize {
        let script = self.lock();
        script.responses.len() - script.next_response
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        // A panicking test thread is the only way to poison this.
        self.script.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn next_response(&self, req: &ModelRequest) -> Result<TestModelResponse, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(preset) = script.responses.get(script.next_response).cloned()
        else {
            return Err(Error::new("script exhausted", ErrorKind::Other));
        };

        match preset.failures {
            Some(0) => {
                return Err(Error::new("scripted failure", ErrorKind::Other));
            }
            Some(failures) if script.failed_attempts < failures => {
                script.failed_attempts += 1;
                return Err(Error::new(
                    "scripted rate limit",
                    ErrorKind::RateLimitExceeded,
                ));
            }
            _ => {}
        }
        script.failed_attempts = 0;
        script.next_response += 1;

        let finish_reason = if preset.has_tool_call() {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        };
        let mut events: VecDeque<_> = preset
            .events
            .into_iter()
            .map(|event| match event {
                PresetEvent::MessageDelta(msg) => {
                    ModelResponseEvent::MessageDelta(msg)
                }
                PresetEvent::ToolCall(req) => ModelResponseEvent::ToolCall(req),
            })
            .collect();
        events.push_back(ModelResponseEvent::Completed(finish_reason));

        Ok(TestModelResponse {
            events,
            delay: self.delay,
            sleep: None,
        })
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req))
    }
}
