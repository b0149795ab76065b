//! Built-in tools that reach the web.
//!
//! All of them share one [`WebToolsConfig`], so a single HTTP client (and
//! its connection pool) serves every call.

mod fetch_page;
mod weather;
mod web_search;

use std::time::Duration;

use reqwest::Client;
use toolchat_core::tool::Error as ToolError;

pub use fetch_page::{FetchPageParameters, FetchPageTool};
pub use weather::{WeatherParameters, WeatherTool};
pub use web_search::{WebSearchParameters, WebSearchTool};

const USER_AGENT: &str = concat!("toolchat/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_SIZE: usize = 5 * 1024 * 1024;

/// The HTTP client and endpoints used by the web tools.
///
/// Endpoints are base URLs without a trailing slash. Override them to
/// point the tools at a mirror or a mock server.
#[derive(Clone, Debug)]
pub struct WebToolsConfig {
    /// The client used for every request.
    pub client: Client,
    /// DuckDuckGo Instant Answer API.
    pub search_endpoint: String,
    /// Open-Meteo geocoding API.
    pub geocoding_endpoint: String,
    /// Open-Meteo forecast API.
    pub forecast_endpoint: String,
    /// Largest response body `fetch_page` reads, in bytes.
    pub max_body_size: usize,
}

impl WebToolsConfig {
    /// Creates a config with the public endpoints and the given client.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            search_endpoint: "https://api.duckduckgo.com".to_owned(),
            geocoding_endpoint: "https://geocoding-api.open-meteo.com/v1"
                .to_owned(),
            forecast_endpoint: "https://api.open-meteo.com/v1".to_owned(),
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

impl Default for WebToolsConfig {
    fn default() -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                warn!("falling back to the default http client: {err}");
                Client::new()
            });
        Self::with_client(client)
    }
}

fn request_error(err: reqwest::Error) -> ToolError {
    ToolError::execution_error().with_reason(format!("request failed: {err}"))
}

/// Cuts `text` to at most `max_len` bytes on a char boundary.
fn truncate_on_char_boundary(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
