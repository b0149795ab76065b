use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Error;

/// The MCP servers config, in the `mcpServers` format shared by most MCP
/// hosts.
///
/// ```json
/// {
///   "mcpServers": {
///     "playwright": { "command": "npx", "args": ["@playwright/mcp@latest"] }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct McpConfig {
    /// Servers keyed by name.
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

/// How to start one MCP server.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct McpServerConfig {
    /// The program to run.
    pub command: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory of the process, inherited if unset.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Skips the server when `true`.
    #[serde(default)]
    pub disabled: bool,
}

impl McpConfig {
    /// Reads the config from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Parses the config from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the servers that are not disabled, sorted by name.
    pub fn enabled_servers(
        &self,
    ) -> impl Iterator<Item = (&str, &McpServerConfig)> {
        self.servers
            .iter()
            .filter(|(_, server)| !server.disabled)
            .map(|(name, server)| (name.as_str(), server))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let config = McpConfig::from_json(
            r#"{
                "mcpServers": {
                    "playwright": {
                        "command": "npx",
                        "args": ["@playwright/mcp@latest"],
                        "env": { "DISPLAY": ":1" },
                        "transport": "stdio"
                    },
                    "filesystem": {
                        "command": "mcp-fs",
                        "cwd": "/tmp",
                        "disabled": true
                    },
                    "airbnb": { "command": "airbnb-mcp" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.servers.len(), 3);
        let playwright = &config.servers["playwright"];
        assert_eq!(playwright.args, ["@playwright/mcp@latest"]);
        assert_eq!(playwright.env["DISPLAY"], ":1");
        assert_eq!(
            config.servers["filesystem"].cwd.as_deref(),
            Some(Path::new("/tmp"))
        );

        let enabled: Vec<_> =
            config.enabled_servers().map(|(name, _)| name).collect();
        assert_eq!(enabled, ["airbnb", "playwright"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(McpConfig::from_json("{}").unwrap(), McpConfig::default());
        assert!(matches!(
            McpConfig::from_json(r#"{"mcpServers": {"x": {}}}"#),
            Err(Error::Parse(_))
        ));
        assert!(matches!(McpConfig::from_json("[1, 2"), Err(Error::Parse(_))));
    }
}
