use std::fmt::{self, Debug};

const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Builder for [`OpenAIConfig`].
#[derive(Clone, PartialEq)]
pub struct OpenAIConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<Option<f32>>,
}

impl OpenAIConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
            temperature: None,
        }
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL, such as `https://api.openai.com/v1`.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the sampling temperature. `None` leaves it to the server.
    #[inline]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> OpenAIConfig {
        let mut base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        while base_url.ends_with('/') {
            base_url.pop();
        }
        OpenAIConfig {
            api_key: self.api_key,
            model: self.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned()),
            base_url,
            temperature: self.temperature.unwrap_or(Some(DEFAULT_TEMPERATURE)),
        }
    }
}

impl Debug for OpenAIConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Configuration for the OpenAI-compatible provider.
#[derive(Clone, PartialEq)]
pub struct OpenAIConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) temperature: Option<f32>,
}

impl OpenAIConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the base URL, without a trailing slash.
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Debug for OpenAIConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OpenAIConfigBuilder::with_api_key("secret").build();
        assert_eq!(config.model(), "gemini-2.0-flash");
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.temperature, Some(0.7));
    }

    #[test]
    fn test_overrides() {
        let config = OpenAIConfigBuilder::with_api_key("secret")
            .with_model("gpt-4o-mini")
            .with_base_url("http://localhost:8080/v1//")
            .with_temperature(None)
            .build();
        assert_eq!(config.model(), "gpt-4o-mini");
        assert_eq!(config.base_url(), "http://localhost:8080/v1");
        assert_eq!(config.temperature, None);
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = OpenAIConfigBuilder::with_api_key("sk-very-secret").build();
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-very-secret"));
        assert!(printed.contains("<redacted>"));
    }
}
