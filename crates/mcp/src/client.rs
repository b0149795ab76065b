use std::path::Path;
use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::model::Tool as RawTool;
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;
use tokio::sync::Mutex;
use crate::{Error, McpConfig, McpServerConfig, McpTool};

struct McpSession {
    name: String,
    service: RunningService<RoleClient, ()>,
    tools: Vec<RawTool>,
}

/// Owns the sessions with every configured MCP server.
pub struct McpClient {
    config: McpConfig,
    sessions: Mutex<Vec<McpSession>>,
}

impl McpClient {
    /// Creates a client for the servers in `config`. Nothing is started
    /// until [`create_all_sessions`](Self::create_all_sessions).
    pub fn from_config(config: McpConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(vec![]),
        }
    }

    /// Creates a client from a config file.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        McpConfig::from_file(path).map(Self::from_config)
    }

    /// Returns the config this client was created from.
    #[inline]
    pub fn config(&self) -> &McpConfig {
        &self.config
    }

    /// Starts every enabled server that is not running yet and lists its
    /// tools.
    ///
    /// Stops at the first server that fails. Sessions started before it
    /// stay open.
    pub async fn create_all_sessions(&self) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        for (name, server) in self.config.enabled_servers() {
            if sessions.iter().any(|session| session.name == name) {
                continue;
            }
            let session = start_session(name, server).await?;
            info!(
                server = name,
                tools = session.tools.len(),
                "mcp session started"
            );
            sessions.push(session);
        }
        Ok(())
    }

    /// Returns the tools of all open sessions.
    ///
    /// When two servers export a tool with the same name, the one from the
    /// server that sorts first wins.
    pub async fn tools(&self) -> Vec<Arc<McpTool>> {
        let sessions = self.sessions.lock().await;
        let listed = sessions
            .iter()
            .map(|session| (session.name.as_str(), session.tools.as_slice()));
        unique_tools(listed)
            .into_iter()
            .filter_map(|(server, raw)| {
                let session =
                    sessions.iter().find(|session| session.name == server)?;
                let peer = session.service.peer().clone();
                Some(Arc::new(McpTool::new(server, raw, peer)))
            })
            .collect()
    }

    /// Returns the names of the open sessions.
    pub async fn session_names(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        sessions.iter().map(|session| session.name.clone()).collect()
    }

    /// Closes every session. Calling this again is a no-op.
    pub async fn close_all_sessions(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock().await);
        for session in sessions {
            match session.service.cancel().await {
                Ok(reason) => {
                    debug!(server = %session.name, "mcp session closed: {reason:?}")
                }
                Err(err) => {
                    warn!(server = %session.name, "failed to close mcp session: {err}")
                }
            }
        }
    }
}

/// Keeps one tool per name, taken from the server whose name sorts first.
fn unique_tools<'a>(
    servers: impl IntoIterator<Item = (&'a str, &'a [RawTool])>,
) -> Vec<(&'a str, &'a RawTool)> {
    let mut servers: Vec<_> = servers.into_iter().collect();
    servers.sort_by_key(|(server, _)| *server);

    let mut picked: Vec<(&str, &RawTool)> = vec![];
    for (server, tools) in servers {
        for raw in tools {
            if let Some((owner, _)) =
                picked.iter().find(|(_, tool)| tool.name == raw.name)
            {
                warn!("tool `{}` of `{server}` is shadowed by `{owner}`", raw.name);
                continue;
            }
            picked.push((server, raw));
        }
    }
    picked
}

async fn start_session(
    name: &str,
    server: &McpServerConfig,
) -> Result<McpSession, Error> {
    let mut command = Command::new(&server.command);
    command.args(&server.args).envs(&server.env);
    if let Some(cwd) = &server.cwd {
        command.current_dir(cwd);
    }
    debug!(server = name, command = %server.command, "starting mcp server");

    let transport =
        TokioChildProcess::new(command).map_err(|source| Error::Spawn {
            server: name.to_owned(),
            source,
        })?;
    let service: RunningService<RoleClient, ()> =
        ().serve(transport).await.map_err(|err| Error::Handshake {
            server: name.to_owned(),
            source: Box::new(err),
        })?;
    let listed = service.list_all_tools().await;
    let tools = match listed {
        Ok(tools) => tools,
        Err(err) => {
            let err = Error::ListTools {
                server: name.to_owned(),
                source: Box::new(err),
            };
            if let Err(cancel_err) = service.cancel().await {
                warn!(server = name, "failed to close mcp session: {cancel_err}");
            }
            return Err(err);
        }
    };

    Ok(McpSession {
        name: name.to_owned(),
        service,
        tools,
    })
}
