//! Common imports for wiring a stream session.
pub use crate::{
    ByteStreamTransport, Callbacks, InMemoryToolRegistry, ProviderKind, RelayConfig, Reporter,
    SemanticEvent, StreamCallbacks, StreamError, StreamResult, StreamSession, ThinkingTracker,
    ToolCall, ToolDispatcher, Transport,
};
