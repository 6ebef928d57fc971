//! Replay captured provider streams or fetch live ones, printing decoded events.
//!
//! Usage:
//!   llm-relay replay capture.sse --provider anthropic --chunk-size 16
//!   llm-relay fetch --body request.json --provider openai
//!
//! Settings not given as flags come from the environment (or `.env`):
//! `LLM_RELAY_PROVIDER`, `LLM_RELAY_CHAT_ID`, `LLM_RELAY_THINKING_PREFIX`,
//! `LLM_RELAY_URL`, `LLM_RELAY_API_KEY`, `LLM_RELAY_TIMEOUT_SECS`.

mod commands;
mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use llm_relay::{EndpointConfig, MemorySink, ProviderKind, RelayConfig, ThinkingTracker};

use crate::commands::CliError;
use crate::render::TerminalCallbacks;

#[derive(Parser)]
#[command(
    name = "llm-relay",
    about = "Decode streamed LLM responses into tokens, thinking and tool calls."
)]
struct Cli {
    /// Wire format (openai, deepseek, anthropic, gemini). Defaults to $LLM_RELAY_PROVIDER.
    #[arg(long, global = true, value_name = "PROVIDER")]
    provider: Option<ProviderKind>,

    /// Print thinking text to stderr.
    #[arg(long, global = true)]
    show_thinking: bool,

    /// Print recorded relay events as JSON lines to stderr when done.
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a captured stream file.
    Replay {
        path: PathBuf,
        /// Deliver the file in reads of this many bytes.
        #[arg(long, value_name = "BYTES")]
        chunk_size: Option<usize>,
    },
    /// POST a JSON request body and decode the streamed response.
    Fetch {
        /// File containing the request body.
        #[arg(long, value_name = "FILE")]
        body: PathBuf,
        /// Endpoint URL. Defaults to $LLM_RELAY_URL.
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    llm_relay::init_observability();
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = RelayConfig::from_env()?;
    if let Some(provider) = cli.provider {
        config = config.provider(provider);
    }
    let sink = cli.events.then(MemorySink::new);
    let reporter = commands::reporter(config.chat_id.clone(), sink.as_ref());

    let tracker = ThinkingTracker::new();
    let progress = tracker.subscribe(|snap| {
        if snap.is_thinking {
            tracing::debug!(step = snap.step, action = %snap.current_action, "progress");
        }
    });
    let callbacks = TerminalCallbacks::stdio(cli.show_thinking, tracker.clone());

    tracker.start_thinking(format!("Decoding {} stream", config.provider));
    let outcome = match cli.command {
        Command::Replay { path, chunk_size } => {
            commands::replay(&path, config, chunk_size, &callbacks, reporter).await
        }
        Command::Fetch { body, url } => {
            let endpoint = match url {
                Some(url) => {
                    let mut endpoint = EndpointConfig::new(url);
                    if let Ok(key) = std::env::var("LLM_RELAY_API_KEY") {
                        endpoint = endpoint.api_key(key);
                    }
                    endpoint
                }
                None => EndpointConfig::from_env()?,
            };
            let body = std::fs::read_to_string(&body).map_err(llm_relay::RelayError::from)?;
            commands::fetch(&endpoint, body, config, &callbacks, reporter).await
        }
    };
    tracker.stop_thinking();
    progress.unsubscribe();

    let result = outcome?;
    for call in callbacks.merged_tool_calls() {
        let args = call
            .arguments
            .to_json()
            .map(|v| v.to_string())
            .unwrap_or_default();
        eprintln!("tool_call {} {args}", call.name);
    }
    if let Some(sink) = sink {
        for record in sink.events() {
            if let Ok(line) = serde_json::to_string(&record) {
                eprintln!("{line}");
            }
        }
    }
    tracing::info!(
        finish_reason = %result.finish_reason,
        tool_calls = result.tool_calls.len(),
        "done"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_with_global_flags() {
        let cli = Cli::try_parse_from([
            "llm-relay",
            "replay",
            "capture.sse",
            "--provider",
            "claude",
            "--chunk-size",
            "8",
            "--show-thinking",
        ])
        .expect("args");
        assert_eq!(cli.provider, Some(ProviderKind::Anthropic));
        assert!(cli.show_thinking);
        assert!(matches!(
            cli.command,
            Command::Replay { chunk_size: Some(8), .. }
        ));
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Cli::try_parse_from(["llm-relay", "--provider", "bard", "replay", "x"]).is_err());
    }
}
