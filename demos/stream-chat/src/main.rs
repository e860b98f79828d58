//! Streams one reply through the chat hook.
//!
//! Chat settings and the conversation thread come from JSON files; the API key
//! is read from the environment (`OPENAI_KEY` unless `--key-var` says otherwise).

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::StreamExt;
use promptline::adapters::openai::OpenAiConfig;
use promptline::adapters::traits::ResponseEvent;
use promptline::config::{HookConfig, Thread, load_chat, load_thread};
use promptline::hook::{ChatHook, DEFAULT_CREDENTIAL_KEY};
use promptline::telemetry::{LogFormat, TelemetryConfig};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "stream-chat",
    about = "Compose a token-budgeted prompt and stream the model's reply",
    version
)]
struct Cli {
    /// Chat settings JSON
    #[arg(long, default_value = "demos/stream-chat/data/chat.json")]
    chat: PathBuf,

    /// Thread JSON with history, context and template values
    #[arg(long)]
    thread: Option<PathBuf>,

    /// Environment variable holding the provider key
    #[arg(long, default_value = DEFAULT_CREDENTIAL_KEY)]
    key_var: String,

    /// Log filter, e.g. `prompt_compose=debug`
    #[arg(long, env = "PROMPTLINE_LOG")]
    log: Option<String>,

    /// One-line log output
    #[arg(long)]
    compact: bool,

    /// Print the composed prompt instead of calling the model
    #[arg(long)]
    dry_run: bool,

    /// Message to answer
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::default();
    if let Some(filter) = &cli.log {
        telemetry = telemetry.with_filter(filter.clone());
    }
    if cli.compact {
        telemetry = telemetry.with_format(LogFormat::Compact);
    }
    promptline::telemetry::init(&telemetry)?;

    let chat = load_chat(&cli.chat)?;
    let thread = match &cli.thread {
        Some(path) => load_thread(path)?,
        None => Thread::default(),
    };

    let hook = ChatHook::openai(OpenAiConfig::from_env()?)?.with_credential_key(&cli.key_var);

    if cli.dry_run {
        let prompt = hook.compositor().compose(&cli.input, &chat, &thread)?;
        for message in prompt.messages() {
            println!("[{}]\n{}\n", message.role(), message.content());
        }
        println!(
            "{} tokens, {} left; dropped {} history and {} context messages",
            prompt.token_count(),
            prompt.remaining(),
            prompt.dropped_history(),
            prompt.dropped_context()
        );
        return Ok(());
    }

    let config = HookConfig::from_env([cli.key_var.as_str()]);
    let mut events = hook
        .respond(&cli.input, &config, &chat, &thread)
        .await
        .context("completion could not start")?;

    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event? {
            ResponseEvent::Delta { content } => {
                stdout.write_all(content.as_bytes())?;
                stdout.flush()?;
            }
            ResponseEvent::Finished { finish_reason } => {
                writeln!(stdout)?;
                info!(?finish_reason, "completion finished");
                return Ok(());
            }
        }
    }

    bail!("stream closed without a finish event")
}
