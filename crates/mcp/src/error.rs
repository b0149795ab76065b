use std::io;
use std::path::PathBuf;

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while loading the config or starting servers.
#[derive(Debug, Error)]
pub enum Error {
    /// The config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The config is not valid JSON of the expected shape.
    #[error("invalid MCP config: {0}")]
    Parse(#[from] serde_json::Error),
    /// The server process could not be started.
    #[error("failed to start MCP server `{server}`: {source}")]
    Spawn {
        /// Name of the server in the config.
        server: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The server started but the MCP handshake failed.
    #[error("MCP handshake with `{server}` failed: {source}")]
    Handshake {
        /// Name of the server in the config.
        server: String,
        /// The protocol error.
        #[source]
        source: BoxError,
    },
    /// The server did not answer the tool listing.
    #[error("failed to list tools of `{server}`: {source}")]
    ListTools {
        /// Name of the server in the config.
        server: String,
        /// The protocol error.
        #[source]
        source: BoxError,
    },
}
