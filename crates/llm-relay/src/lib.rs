//! Streaming response normalization for LLM providers.
//!
//! Three wire formats (delta-style SSE, typed-event SSE and NDJSON) are decoded
//! into one [`SemanticEvent`] stream. A [`StreamSession`] reads chunks from a
//! [`Transport`], threads partial lines across chunk boundaries, forwards
//! events to [`StreamCallbacks`] and hands tool calls to a [`ToolDispatcher`]
//! without waiting for them.
//!
//! ```
//! use llm_relay::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), StreamError> {
//! let session = StreamSession::new(RelayConfig::new(ProviderKind::OpenAi));
//! let mut transport = ByteStreamTransport::from_chunks([
//!     "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n",
//!     "data: [DONE]\n\n",
//! ]);
//! let callbacks = Callbacks::new().with_token(|text| print!("{text}"));
//!
//! let result = session.handle(&mut transport, &callbacks).await?;
//! assert_eq!(result.content, "Hi");
//! # Ok(())
//! # }
//! ```

/// Callback contract for stream consumers.
pub mod callbacks;
/// Session and endpoint configuration.
pub mod config;
/// Per-provider line decoders.
pub mod decode;
/// Background tool execution.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// Semantic events and tool-call values.
pub mod event;
/// Global `tracing` subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Provider identifiers and decoder selection.
pub mod provider;
/// Aggregated stream output.
pub mod result;
/// Stream read loop.
pub mod session;
/// Lifecycle events, task records and sinks.
pub mod sink;
/// Progress narration state machine.
pub mod thinking;
/// Tool registry contract and in-memory registry.
pub mod tools;
/// Byte sources and incremental UTF-8 decoding.
pub mod transport;

pub use callbacks::{Callbacks, NoCallbacks, StreamCallbacks};
pub use config::{EndpointConfig, RelayConfig, ThinkingFormat};
pub use decode::{Decoded, StreamDecoder, decode};
pub use dispatch::{ToolDispatcher, ToolOutcome};
pub use errors::{RelayError, StreamError, StreamErrorCode, ToolError, TransportError};
pub use event::{SemanticEvent, ToolArguments, ToolCall, ToolCallAccumulator};
pub use observability::init_observability;
pub use provider::ProviderKind;
pub use result::StreamResult;
pub use session::{SessionState, StopHandle, StreamSession};
pub use sink::{MemorySink, RelayEvent, Reporter, Sink, TracingSink};
pub use thinking::{Subscription, ThinkingSnapshot, ThinkingStatus, ThinkingTracker};
pub use tools::{InMemoryToolRegistry, ToolOutput, ToolRegistry};
pub use transport::{ByteStreamTransport, Transport, Utf8ChunkDecoder};
