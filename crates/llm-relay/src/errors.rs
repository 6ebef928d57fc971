use std::fmt;

use serde_json::Value;

/// Machine-readable code for a stream failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamErrorCode {
    /// The provider reported a failure inside the stream itself.
    ProviderError,
    /// Reading the transport failed.
    TransportFailed,
    /// A caller-supplied callback returned an error.
    CallbackFailed,
}

impl StreamErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderError => "provider_error",
            Self::TransportFailed => "transport_failed",
            Self::CallbackFailed => "callback_failed",
        }
    }
}

impl fmt::Display for StreamErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by `StreamSession::handle_stream` and delivered to `on_error`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// Malformed or failed stream: an in-band provider error, or a loop failure
    /// that was wrapped on its way out.
    #[error("stream parse failure [{code}]: {message}")]
    StreamParse {
        code: StreamErrorCode,
        message: String,
        /// Raw provider error payload, or the original error message.
        details: Value,
    },
    /// Reading the transport failed mid-stream.
    #[error("stream transport failed: {message}")]
    Transport { message: String },
    /// A caller-supplied callback returned an error.
    #[error("stream callback failed: {message}")]
    Callback { message: String },
    /// The session already has a stream in flight.
    #[error("a stream is already in progress on this session")]
    Busy,
}

impl StreamError {
    /// Builds a stream-parse failure from a code and details payload.
    pub fn stream_parse(code: StreamErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self::StreamParse {
            code,
            message: message.into(),
            details,
        }
    }

    /// Wraps an in-band provider error payload.
    pub fn provider(data: Value) -> Self {
        let message = data
            .get("message")
            .and_then(|v| v.as_str())
            .or_else(|| data.as_str())
            .unwrap_or("provider reported an error")
            .to_string();
        Self::stream_parse(StreamErrorCode::ProviderError, message, data)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Wraps an error returned by a stream callback.
    pub fn callback(err: &dyn std::error::Error) -> Self {
        Self::Callback {
            message: err.to_string(),
        }
    }

    /// Returns the machine-readable code. `Busy` has none.
    pub fn code(&self) -> Option<StreamErrorCode> {
        match self {
            Self::StreamParse { code, .. } => Some(*code),
            Self::Transport { .. } => Some(StreamErrorCode::TransportFailed),
            Self::Callback { .. } => Some(StreamErrorCode::CallbackFailed),
            Self::Busy => None,
        }
    }

    /// Provider payload or original error message, for stream-parse failures.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::StreamParse { details, .. } => Some(details),
            _ => None,
        }
    }

    /// True for failures raised by a running stream (and delivered to
    /// `on_error`); false for `Busy`, which is rejected before streaming starts.
    pub fn is_stream_failure(&self) -> bool {
        !matches!(self, Self::Busy)
    }
}

/// Errors produced while reading raw chunks from a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}

impl From<TransportError> for StreamError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Read { message } => StreamError::transport(message),
        }
    }
}

/// Errors produced by a tool registry or the dispatch task that runs it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {tool}")]
    NotFound { tool: String },
    #[error("tool execution failed ({tool}): {message}")]
    Execution { tool: String, message: String },
    /// The spawned dispatch task panicked or was aborted.
    #[error("tool task did not complete ({tool}): {message}")]
    Join { tool: String, message: String },
}

impl ToolError {
    pub fn execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Returns the tool name this error is about.
    pub fn tool(&self) -> &str {
        match self {
            Self::NotFound { tool } | Self::Execution { tool, .. } | Self::Join { tool, .. } => {
                tool
            }
        }
    }
}

/// Setup-time errors (configuration, input validation, I/O outside the stream).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RelayError {
    fn from(value: std::io::Error) -> Self {
        RelayError::Io(value.to_string())
    }
}
