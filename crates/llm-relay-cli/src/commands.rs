use std::path::Path;
use std::sync::Arc;

use llm_relay::{
    ByteStreamTransport, EndpointConfig, MemorySink, ProviderKind, RelayConfig, RelayError,
    RelayEvent, Reporter, StreamCallbacks, StreamError, StreamResult, StreamSession, Transport,
};
use reqwest::header::CONTENT_TYPE;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Runs a stream through a session and reports its lifecycle.
pub async fn run_stream<T>(
    config: RelayConfig,
    transport: &mut T,
    callbacks: &dyn StreamCallbacks,
    reporter: Reporter,
) -> Result<StreamResult, CliError>
where
    T: Transport + ?Sized,
{
    let session = StreamSession::new(config).with_reporter(reporter);
    Ok(session.handle(transport, callbacks).await?)
}

/// Replays a captured provider stream from `path`, optionally split into
/// `chunk_size`-byte reads.
pub async fn replay(
    path: &Path,
    config: RelayConfig,
    chunk_size: Option<usize>,
    callbacks: &dyn StreamCallbacks,
    reporter: Reporter,
) -> Result<StreamResult, CliError> {
    let data = std::fs::read(path).map_err(RelayError::from)?;
    info!(path = %path.display(), bytes = data.len(), chunk_size = ?chunk_size, "replaying stream");
    let mut transport = match chunk_size {
        Some(size) => ByteStreamTransport::from_bytes_chunked(data, size),
        None => ByteStreamTransport::from_chunks([data]),
    };
    reporter.event(RelayEvent::RequestSent {
        provider: config.provider.to_string(),
        target: Some(path.display().to_string()),
    });
    run_stream(config, &mut transport, callbacks, reporter).await
}

/// POSTs `body` to the endpoint and streams the response.
pub async fn fetch(
    endpoint: &EndpointConfig,
    body: String,
    config: RelayConfig,
    callbacks: &dyn StreamCallbacks,
    reporter: Reporter,
) -> Result<StreamResult, CliError> {
    endpoint.validate()?;
    let client = reqwest::Client::builder()
        .timeout(endpoint.timeout)
        .build()?;
    let mut request = client
        .post(endpoint.url.as_str())
        .header(CONTENT_TYPE, "application/json")
        .body(body);
    if let Some(key) = endpoint.api_key.as_deref().filter(|k| !k.is_empty()) {
        request = match config.provider {
            ProviderKind::OpenAi => request.bearer_auth(key),
            ProviderKind::Anthropic => request
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01"),
            ProviderKind::Gemini => request.header("x-goog-api-key", key),
        };
    }

    reporter.event(RelayEvent::RequestSent {
        provider: config.provider.to_string(),
        target: Some(endpoint.url.clone()),
    });
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CliError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let mut transport = ByteStreamTransport::from_response(response);
    run_stream(config, &mut transport, callbacks, reporter).await
}

/// Reporter that logs through `tracing` and, when `events` is set, also keeps
/// records for a JSON dump at exit.
pub fn reporter(chat_id: Option<String>, events: Option<&MemorySink>) -> Reporter {
    match events {
        Some(sink) => Reporter::new(Arc::new(sink.clone()), chat_id),
        None => Reporter::tracing(chat_id),
    }
}
