use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry_notify;
use toolchat_model::{
    ModelFinishReason, ModelProvider, ModelProviderError, ModelRequest,
    ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tracing::Instrument;

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type TranscriptFn = Box<dyn Fn(String) + Send + 'static>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, RetryPolicy, TranscriptFn)
        -> BoxedSendRequestFuture + Send + Sync
>;

/// How failed model requests are retried.
///
/// Only errors whose [`ErrorKind`](toolchat_model::ErrorKind) is retryable
/// are retried. A response that fails halfway through streaming is never
/// retried, since part of it may already have been shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Upper bound for the delay between two attempts.
    pub max_interval: Duration,
    /// Give up once this much time has passed since the first attempt.
    pub max_elapsed_time: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub const NEVER: RetryPolicy = RetryPolicy {
        initial_interval: Duration::ZERO,
        max_interval: Duration::ZERO,
        max_elapsed_time: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

/// A wrapper around a model provider that maintains an execution
/// environment for the provider and provides a type-erased interface
/// for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
}

impl ModelClient {
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);
        let handler_fn: HandlerFn =
            Arc::new(move |req, retry_policy, on_transcript| {
                let provider = Arc::clone(&provider);
                Box::pin(
                    async move {
                        trace!("got a request: {:?}", req);
                        let resp_or_err =
                            send_with_retry(&*provider, &req, retry_policy)
                                .await;
                        handle_response::<P>(resp_or_err, on_transcript).await
                    }
                    .instrument(debug_span!("model client req")),
                )
            });
        Self { handler_fn }
    }

    /// Sends a request and collects the whole response.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    #[inline]
    pub async fn send_request(
        &self,
        req: ModelRequest,
        retry_policy: RetryPolicy,
        on_transcript: impl Fn(String) + Send + 'static,
    ) -> SendRequestResult {
        (self.handler_fn)(req, retry_policy, Box::new(on_transcript)).await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default)]
pub struct ModelClientResponse {
    /// All text deltas joined together.
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

async fn send_with_retry<P: ModelProvider>(
    provider: &P,
    req: &ModelRequest,
    retry_policy: RetryPolicy,
) -> Result<P::Response, P::Error> {
    if retry_policy.max_elapsed_time.is_zero() {
        return provider.send_request(req).await;
    }

    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(retry_policy.initial_interval)
        .with_max_interval(retry_policy.max_interval)
        .with_max_elapsed_time(Some(retry_policy.max_elapsed_time))
        .build();
    retry_notify(
        backoff,
        || {
            let fut = provider.send_request(req);
            async move {
                fut.await.map_err(|err| {
                    if err.kind().is_retryable() {
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        },
        |err: P::Error, delay: Duration| {
            warn!("model request failed, retrying in {delay:?}: {err}");
        },
    )
    .await
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_transcript: TranscriptFn,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut collected = ModelClientResponse::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("response broke off: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                collected.transcript.push_str(&msg);
                on_transcript(msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                collected.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                collected.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use toolchat_model::{ErrorKind, ModelMessage};
    use toolchat_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;

    const FAST_RETRY: RetryPolicy = RetryPolicy {
        initial_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        max_elapsed_time: Duration::from_secs(5),
    };

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        for _ in 0..3 {
            model_provider.add_response(PresetResponse::with_events([
                PresetEvent::MessageDelta("How ".to_owned()),
                PresetEvent::MessageDelta("are ".to_owned()),
                PresetEvent::MessageDelta("you?".to_owned()),
            ]));
        }

        let model_client = ModelClient::new(model_provider);

        for _ in 0..3 {
            let deltas = Arc::new(Mutex::new(vec![]));
            let resp = model_client
                .send_request(request(), RetryPolicy::NEVER, {
                    let deltas = Arc::clone(&deltas);
                    move |delta| deltas.lock().unwrap().push(delta)
                })
                .await
                .unwrap();
            assert_eq!(resp.transcript, "How are you?");
            assert_eq!(resp.finish_reason, Some(ModelFinishReason::Stop));
            assert_eq!(deltas.lock().unwrap().len(), 3);
        }
    }

    #[tokio::test]
    async fn test_retryable_errors_are_retried() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_response(PresetResponse::with_text("Finally.").with_failures(2));
        let model_client = ModelClient::new(model_provider.clone());

        let resp = model_client
            .send_request(request(), FAST_RETRY, |_| {})
            .await
            .unwrap();
        assert_eq!(resp.transcript, "Finally.");
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_text("Never.").with_failures(0));
        let model_client = ModelClient::new(model_provider.clone());

        let err = model_client
            .send_request(request(), FAST_RETRY, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(model_provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_text("Late.").with_failures(1));
        let model_client = ModelClient::new(model_provider.clone());

        let err = model_client
            .send_request(request(), RetryPolicy::NEVER, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(model_provider.requests().len(), 1);
    }
}
