//! An interactive terminal chat built on the `toolchat` library.

#[macro_use]
extern crate tracing;

mod settings;

use std::io::Write as _;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader, Stdin};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use toolchat::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};
use toolchat_mcp::McpClient;
use toolchat_openai_model::OpenAIProvider;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

enum SessionEvent {
    Transcript(String),
    ToolCall(String),
}

enum Command<'a> {
    Quit,
    Clear,
    Message(&'a str),
    Nothing,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Command::Nothing
        } else if line.eq_ignore_ascii_case("exit")
            || line.eq_ignore_ascii_case("quit")
        {
            Command::Quit
        } else if line.eq_ignore_ascii_case("clear") {
            Command::Clear
        } else {
            Command::Message(line)
        }
    }
}

const BAR_CHAR: &str = "▎";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let dotenv_error = settings::load_dotenv();
    let settings = Settings::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
    if let Some(err) = dotenv_error {
        warn!("ignoring .env: {err}");
    }

    let model_config = settings.model_config()?;
    println!("Initializing chat with {}...", model_config.model());
    let model_provider = OpenAIProvider::new(model_config);

    let mcp_client = settings.mcp_client()?.map(Arc::new);
    if let Some(mcp_client) = &mcp_client {
        if let Err(err) = mcp_client.create_all_sessions().await {
            mcp_client.close_all_sessions().await;
            return Err(err).context("failed to start MCP servers");
        }
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let mut builder = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(
            DEFAULT_SYSTEM_PROMPT.replace("{{HOST_OS}}", host_os()),
        )
        .with_max_steps(settings.max_steps)
        .with_memory(!settings.no_memory)
        .on_transcript({
            let event_tx = event_tx.clone();
            move |transcript| {
                event_tx
                    .send(SessionEvent::Transcript(transcript.to_owned()))
                    .ok();
            }
        })
        .on_tool_call(move |req| {
            event_tx.send(SessionEvent::ToolCall(req.name.clone())).ok();
        });
    if settings.no_web_tools {
        builder = builder.without_web_tools();
    }
    if let Some(mcp_client) = &mcp_client {
        builder = builder.with_mcp_client(Arc::clone(mcp_client));
    }
    let session = builder.build().await;

    print_banner(mcp_client.as_deref()).await;
    let result = chat_loop(&session, event_rx).await;
    session.close().await;
    result
}

async fn print_banner(mcp_client: Option<&McpClient>) {
    println!();
    println!("{}", "===== Interactive Tool Chat =====".bold());
    println!("Type 'exit' or 'quit' to end the conversation");
    println!("Type 'clear' to clear conversation history");
    if let Some(mcp_client) = mcp_client {
        let names = mcp_client.session_names().await;
        if !names.is_empty() {
            println!("MCP servers: {}", names.join(", "));
        }
    }
    println!("=================================");
}

async fn chat_loop(
    session: &Session,
    mut event_rx: mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<()> {
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .context("invalid progress template")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut stdin = BufReader::new(io::stdin());

    loop {
        print!("\n{} ", "You:".bright_green().bold());
        std::io::stdout().flush()?;

        let Some(line) = read_line(&mut stdin).await else {
            break;
        };
        let input = match Command::parse(&line) {
            Command::Nothing => continue,
            Command::Quit => {
                println!("Ending conversation...");
                break;
            }
            Command::Clear => {
                session.clear_history().await?;
                println!("Conversation history cleared.");
                continue;
            }
            Command::Message(input) => input,
        };

        let mut printer = TurnPrinter::new(progress_style.clone());
        let mut turn = pin!(session.send_message(input));
        let result = loop {
            printer.tick();
            select! {
                result = &mut turn => break result,
                Some(event) = event_rx.recv() => printer.show(event),
                _ = sleep(Duration::from_millis(100)) => {}
            }
        };
        // Callbacks run before the turn resolves, so whatever they sent is
        // already queued.
        while let Ok(event) = event_rx.try_recv() {
            printer.show(event);
        }
        printer.finish(result);
    }
    Ok(())
}

/// Prints one turn: a spinner while waiting, then streamed text.
struct TurnPrinter {
    style: ProgressStyle,
    spinner: Option<ProgressBar>,
    streamed: bool,
}

impl TurnPrinter {
    fn new(style: ProgressStyle) -> Self {
        Self {
            style,
            spinner: None,
            streamed: false,
        }
    }

    fn tick(&mut self) {
        if self.streamed {
            return;
        }
        self.spinner
            .get_or_insert_with(|| {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(self.style.clone());
                spinner.set_message("🤔 Thinking...");
                spinner
            })
            .inc(1);
    }

    fn clear_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn show(&mut self, event: SessionEvent) {
        self.clear_spinner();
        match event {
            SessionEvent::ToolCall(name) => {
                if self.streamed {
                    println!();
                    self.streamed = false;
                }
                println!("{}🔧 {}", BAR_CHAR.bright_yellow(), name.bright_white());
            }
            SessionEvent::Transcript(delta) => {
                if !self.streamed {
                    print!("{} ", "Assistant:".bright_cyan().bold());
                    self.streamed = true;
                }
                print!("{delta}");
                std::io::stdout().flush().ok();
            }
        }
    }

    fn finish(mut self, result: Result<String, toolchat::core::AgentError>) {
        self.clear_spinner();
        match result {
            Ok(answer) => {
                if !self.streamed && !answer.is_empty() {
                    print!("{} {answer}", "Assistant:".bright_cyan().bold());
                }
                println!();
            }
            Err(err) => {
                if self.streamed {
                    println!();
                }
                println!("{} {err}", "Error:".bright_red().bold());
            }
        }
    }
}

async fn read_line(stdin: &mut BufReader<Stdin>) -> Option<String> {
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(0) => None,
        Ok(_) => Some(line),
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}

#[inline]
fn host_os() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
