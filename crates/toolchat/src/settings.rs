use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use toolchat_mcp::McpClient;
use toolchat_openai_model::{OpenAIConfig, OpenAIConfigBuilder};

const DEFAULT_MCP_CONFIG: &str = "browser_mcp.json";
const FALLBACK_API_KEY_VARS: [&str; 2] = ["GOOGLE_API_KEY", "OPENAI_API_KEY"];

/// Chat with a model that can search the web, read pages, check the
/// weather and use MCP servers.
#[derive(Debug, Parser)]
#[command(name = "toolchat", version)]
pub struct Settings {
    /// API key of the model provider. Falls back to GOOGLE_API_KEY, then
    /// OPENAI_API_KEY.
    #[arg(long, env = "TOOLCHAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API. Defaults to Gemini's.
    #[arg(long, env = "TOOLCHAT_BASE_URL")]
    pub base_url: Option<String>,

    /// Model name.
    #[arg(long, env = "TOOLCHAT_MODEL")]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arg(long, env = "TOOLCHAT_TEMPERATURE")]
    pub temperature: Option<f32>,

    /// Maximum number of model calls per message.
    #[arg(long, default_value_t = 15)]
    pub max_steps: usize,

    /// MCP servers config file.
    #[arg(long, env = "TOOLCHAT_MCP_CONFIG")]
    pub mcp_config: Option<PathBuf>,

    /// Forget the conversation after every message.
    #[arg(long)]
    pub no_memory: bool,

    /// Do not offer the built-in web tools.
    #[arg(long)]
    pub no_web_tools: bool,

    /// Log debug output to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Settings {
    /// Resolves the API key, looking up fallbacks with `lookup_env`.
    pub fn api_key_with<F>(&self, lookup_env: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = self.api_key.as_deref().filter(|k| !k.is_empty())
        {
            return Ok(api_key.to_owned());
        }
        for var in FALLBACK_API_KEY_VARS {
            if let Some(api_key) = lookup_env(var).filter(|k| !k.is_empty()) {
                return Ok(api_key);
            }
        }
        bail!(
            "no API key: pass --api-key or set TOOLCHAT_API_KEY, {}",
            FALLBACK_API_KEY_VARS.join(" or ")
        )
    }

    pub fn model_config(&self) -> Result<OpenAIConfig> {
        let api_key = self.api_key_with(|var| std::env::var(var).ok())?;
        let mut builder = OpenAIConfigBuilder::with_api_key(api_key);
        if let Some(model) = &self.model {
            builder = builder.with_model(model);
        }
        if let Some(base_url) = &self.base_url {
            builder = builder.with_base_url(base_url);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.with_temperature(Some(temperature));
        }
        Ok(builder.build())
    }

    /// Loads the MCP client if a config is available.
    ///
    /// A missing default config means no MCP servers. A missing config that
    /// was asked for explicitly is an error.
    pub fn mcp_client(&self) -> Result<Option<McpClient>> {
        let path = match &self.mcp_config {
            Some(path) => path.as_path(),
            None => {
                let path = Path::new(DEFAULT_MCP_CONFIG);
                if !path.exists() {
                    debug!("{DEFAULT_MCP_CONFIG} not found, running without MCP");
                    return Ok(None);
                }
                path
            }
        };
        let client = McpClient::from_config_file(path).with_context(|| {
            format!("failed to load MCP config from {}", path.display())
        })?;
        Ok(Some(client))
    }

    /// The `tracing` filter used unless `RUST_LOG` is set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "warn,toolchat=debug,toolchat_core=debug,toolchat_mcp=debug,\
toolchat_openai_model=debug,toolchat_actor=debug"
        } else {
            "warn"
        }
    }
}

/// Loads `.env` from the working directory into the environment.
///
/// Returns the error worth reporting once logging is up. A missing file is
/// not one.
pub fn load_dotenv() -> Option<dotenvy::Error> {
    reportable_dotenv_error(dotenvy::dotenv())
}

fn reportable_dotenv_error<T>(
    result: Result<T, dotenvy::Error>,
) -> Option<dotenvy::Error> {
    match result {
        Err(err) if !err.not_found() => Some(err),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn parse(args: &[&str]) -> Settings {
        Settings::try_parse_from(std::iter::once("toolchat").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_flags() {
        let settings = parse(&[
            "--model",
            "gemini-2.5-pro",
            "--max-steps",
            "4",
            "--no-memory",
            "--mcp-config",
            "servers.json",
            "-v",
        ]);
        assert_eq!(settings.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(settings.max_steps, 4);
        assert!(settings.no_memory);
        assert!(!settings.no_web_tools);
        assert_eq!(settings.mcp_config, Some(PathBuf::from("servers.json")));
        assert!(settings.default_log_filter().contains("toolchat_core=debug"));
    }

    #[test]
    fn test_api_key_fallbacks() {
        let mut settings = parse(&[]);
        settings.api_key = None;

        let key = settings
            .api_key_with(|var| (var == "OPENAI_API_KEY").then(|| "sk-openai".to_owned()))
            .unwrap();
        assert_eq!(key, "sk-openai");

        let key = settings
            .api_key_with(|var| Some(format!("from-{var}")))
            .unwrap();
        assert_eq!(key, "from-GOOGLE_API_KEY");

        assert!(settings.api_key_with(|_| None).is_err());

        settings.api_key = Some("sk-flag".to_owned());
        assert_eq!(settings.api_key_with(|_| None).unwrap(), "sk-flag");
    }

    #[test]
    fn test_missing_explicit_mcp_config() {
        let mut settings = parse(&[]);
        settings.mcp_config = Some(PathBuf::from("/nonexistent/toolchat/mcp.json"));
        let err = settings.mcp_client().err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/toolchat/mcp.json"));
    }

    #[test]
    fn test_dotenv_errors() {
        let missing = dotenvy::from_path("/nonexistent/toolchat/.env");
        assert!(reportable_dotenv_error(missing).is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TOOLCHAT_BROKEN=\"unterminated").unwrap();
        let malformed = dotenvy::from_path(file.path());
        assert!(reportable_dotenv_error(malformed).is_some());
    }
}
