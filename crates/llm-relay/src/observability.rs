use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "llm-relay.logs.jsonl";

/// Quiet dependencies (reqwest, hyper) but keep stream lifecycle logs.
const DEFAULT_DIRECTIVES: &str = "warn,llm_relay=info,llm_relay_cli=info";

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn logging_enabled() -> bool {
    std::env::var("LLM_RELAY_OBSERVABILITY_ENABLED")
        .ok()
        .map(|value| parse_flag(&value).unwrap_or(true))
        .unwrap_or(true)
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("LLM_RELAY_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Installs the global `tracing` subscriber once per process.
///
/// Environment variables:
/// - `LLM_RELAY_OBSERVABILITY_ENABLED`: set to `false`/`0`/`off` to install nothing.
/// - `LLM_RELAY_LOG_LEVEL`: level or filter directive; falls back to `RUST_LOG`, then
///   `warn` for dependencies and `info` for this crate and its CLI.
/// - `LLM_RELAY_JSON_LOG_PATH`: write JSONL to this file instead of compact lines on stderr.
///
/// Console output goes to stderr so streamed text on stdout stays clean. Each
/// `handle_stream` call runs inside a `stream` span carrying the provider and
/// chat id, which the JSON layer records on every line.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !logging_enabled() {
            return;
        }

        let filter = env_filter();
        match std::env::var("LLM_RELAY_JSON_LOG_PATH") {
            Ok(raw) if !raw.trim().is_empty() => {
                let path = std::path::PathBuf::from(raw);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    let _ = std::fs::create_dir_all(parent);
                }
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| std::path::Path::new("."));
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(DEFAULT_LOG_FILE);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(false)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            _ => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
