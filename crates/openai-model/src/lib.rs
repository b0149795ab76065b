//! A model provider for OpenAI-compatible chat completion APIs.
//!
//! The defaults point at Gemini's OpenAI-compatible endpoint, but any
//! server that speaks the streaming `/chat/completions` protocol works.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, StatusCode, header};
use toolchat_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
pub use response::OpenAIResponse;

const MAX_ERROR_BODY_LEN: usize = 512;

/// Error type for [`OpenAIProvider`].
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

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        429 => ErrorKind::RateLimitExceeded,
        401 | 403 => ErrorKind::Unauthorized,
        408 => ErrorKind::Transient,
        code if (500..600).contains(&code) => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

fn kind_for_reqwest_error(err: &reqwest::Error) -> ErrorKind {
    if err.is_connect() || err.is_timeout() {
        ErrorKind::Transient
    } else {
        ErrorKind::Other
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY_LEN {
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
        body.push_str("...");
    }
    body
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Creates a new `OpenAIProvider` that sends requests through `client`.
    #[inline]
    pub fn with_client(config: OpenAIConfig, client: Client) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        debug!(
            model = %self.config.model,
            messages = openai_req.messages.len(),
            tools = openai_req.tools.len(),
            "sending chat completion request"
        );
        let resp_fut = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&openai_req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                Error::new(format!("request failed: {err}"), kind_for_reqwest_error(&err))
            })?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(%status, "model server returned an error");
                return Err(Error::new(
                    format!("HTTP {status}: {}", truncate_body(body)),
                    kind_for_status(status),
                ));
            }

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let is_event_stream = content_type
                .as_deref()
                .and_then(|v| v.parse::<Mime>().ok())
                .is_some_and(|m| m.subtype().as_str() == "event-stream");
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            let chunks = Chunks::from_response(resp);
            Ok(OpenAIResponse::from_sse(Sse::new(chunks)))
        }
    }
}
