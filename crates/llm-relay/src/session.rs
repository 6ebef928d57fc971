use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::callbacks::StreamCallbacks;
use crate::config::RelayConfig;
use crate::decode::StreamDecoder;
use crate::dispatch::ToolDispatcher;
use crate::errors::StreamError;
use crate::event::SemanticEvent;
use crate::provider::ProviderKind;
use crate::result::StreamResult;
use crate::sink::{RelayEvent, Reporter};
use crate::transport::{Transport, Utf8ChunkDecoder};

/// Lifecycle of the most recent `handle_stream` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Completed,
    Errored,
    /// Ended early through `stop_stream`.
    Stopped,
}

/// Requests that a running stream end after its current chunk read returns.
#[derive(Clone, Debug)]
pub struct StopHandle {
    streaming: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.streaming.store(false, Ordering::Release);
    }
}

/// Reads a provider stream, decodes it and dispatches events to callbacks.
///
/// One stream at a time per session; a concurrent second call is rejected
/// with [`StreamError::Busy`]. The session is reusable once a call returns.
pub struct StreamSession {
    config: RelayConfig,
    streaming: Arc<AtomicBool>,
    in_flight: AtomicBool,
    buffer: Mutex<String>,
    state: Mutex<SessionState>,
    dispatcher: Option<Arc<ToolDispatcher>>,
    reporter: Option<Reporter>,
}

#[derive(Default)]
struct Accumulated {
    content: String,
    thinking: String,
    tool_calls: Vec<crate::event::ToolCall>,
    last_finish: Option<String>,
}

impl Accumulated {
    fn into_result(self) -> StreamResult {
        if let Some(reason) = &self.last_finish {
            debug!(provider_reason = %reason, "provider finish reason observed");
        }
        StreamResult {
            content: self.content,
            tool_calls: self.tool_calls,
            thinking_content: self.thinking,
            ..StreamResult::default()
        }
    }
}

enum LoopExit {
    Eof,
    Stopped,
}

/// Clears streaming state when `handle_stream` returns or its future is dropped.
struct StreamingGuard<'a> {
    session: &'a StreamSession,
}

impl Drop for StreamingGuard<'_> {
    fn drop(&mut self) {
        self.session.streaming.store(false, Ordering::Release);
        self.session.buffer_guard().clear();
        self.session.in_flight.store(false, Ordering::Release);
    }
}

impl StreamSession {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            streaming: Arc::new(AtomicBool::new(false)),
            in_flight: AtomicBool::new(false),
            buffer: Mutex::new(String::new()),
            state: Mutex::new(SessionState::Idle),
            dispatcher: None,
            reporter: None,
        }
    }

    /// Executes registered tools for every tool-call event, without waiting.
    ///
    /// Each event is dispatched as it arrives. Delta-SSE providers stream a
    /// call as several fragments: the first (name, usually empty arguments)
    /// runs the tool with `{}` and the argument-only fragments that follow are
    /// not executed. For those providers, merge fragments with
    /// [`crate::event::ToolCallAccumulator`] in `on_tool_call` and dispatch the
    /// merged calls after the stream instead.
    pub fn with_dispatcher(mut self, dispatcher: Arc<ToolDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Reports task transitions and lifecycle events for each stream.
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            streaming: self.streaming.clone(),
        }
    }

    pub fn stop_stream(&self) {
        self.stop_handle().stop();
    }

    pub fn is_currently_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Unconsumed partial line, for diagnostics.
    pub fn buffer(&self) -> String {
        self.buffer_guard().clone()
    }

    pub fn clear_buffer(&self) {
        self.buffer_guard().clear();
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Streams with the provider from this session's config.
    pub async fn handle<T>(
        &self,
        transport: &mut T,
        callbacks: &dyn StreamCallbacks,
    ) -> Result<StreamResult, StreamError>
    where
        T: Transport + ?Sized,
    {
        self.handle_stream(transport, callbacks, self.config.provider).await
    }

    /// Reads `transport` to end-of-data (or until stopped), decoding with
    /// `provider`'s wire format.
    ///
    /// Failures are delivered to `on_error` and also returned.
    pub async fn handle_stream<T>(
        &self,
        transport: &mut T,
        callbacks: &dyn StreamCallbacks,
        provider: ProviderKind,
    ) -> Result<StreamResult, StreamError>
    where
        T: Transport + ?Sized,
    {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            warn!(provider = %provider, "handle_stream called while a stream is in flight");
            return Err(StreamError::Busy);
        }
        let _guard = StreamingGuard { session: self };
        self.buffer_guard().clear();
        self.streaming.store(true, Ordering::Release);
        self.set_state(SessionState::Streaming);
        debug!(provider = %provider, "stream started");

        let mut task = self.reporter.as_ref().map(|reporter| {
            reporter.begin_task("stream", serde_json::json!({ "provider": provider.as_str() }))
        });

        let span = info_span!(
            "stream",
            provider = %provider,
            chat_id = self.config.chat_id.as_deref().unwrap_or("-"),
        );
        match self
            .read_loop(transport, callbacks, provider)
            .instrument(span)
            .await
        {
            Ok((result, exit)) => {
                let state = match exit {
                    LoopExit::Eof => SessionState::Completed,
                    LoopExit::Stopped => SessionState::Stopped,
                };
                self.set_state(state);
                info!(
                    provider = %provider,
                    state = ?state,
                    content_len = result.content.len(),
                    tool_calls = result.tool_calls.len(),
                    "stream finished"
                );
                if let Some(reporter) = &self.reporter {
                    reporter.event(RelayEvent::AssistantMessage {
                        content: result.content.clone(),
                        tool_calls: result.tool_calls.len(),
                    });
                    if let Some(task) = task.as_mut() {
                        reporter.complete_task(task, serde_json::json!({
                            "content": result.content,
                            "tool_calls": result.tool_calls.len(),
                            "finish_reason": result.finish_reason,
                        }));
                    }
                }
                callbacks.on_complete(&result);
                Ok(result)
            }
            Err(err) => {
                self.set_state(SessionState::Errored);
                warn!(provider = %provider, error = %err, "stream failed");
                if let Some(reporter) = &self.reporter {
                    reporter.event(RelayEvent::Error {
                        code: err.code().map(|c| c.to_string()),
                        message: err.to_string(),
                    });
                    if let Some(task) = task.as_mut() {
                        reporter.fail_task(task, err.to_string());
                    }
                }
                callbacks.on_error(&err);
                Err(err)
            }
        }
    }

    async fn read_loop<T>(
        &self,
        transport: &mut T,
        callbacks: &dyn StreamCallbacks,
        provider: ProviderKind,
    ) -> Result<(StreamResult, LoopExit), StreamError>
    where
        T: Transport + ?Sized,
    {
        let decoder = provider.decoder();
        let mut utf8 = Utf8ChunkDecoder::new();
        let mut acc = Accumulated::default();
        let mut received: u64 = 0;

        loop {
            if !self.is_currently_streaming() {
                debug!(provider = %provider, received, "stop requested; leaving read loop");
                return Ok((acc.into_result(), LoopExit::Stopped));
            }
            let Some(chunk) = transport.next_chunk().await? else {
                break;
            };
            received += chunk.len() as u64;
            let text = utf8.push(&chunk);
            let events = self.decode_appended(decoder, &text);
            debug!(bytes = chunk.len(), events = events.len(), "chunk decoded");
            self.apply_events(events, callbacks, &mut acc)?;
        }

        // End of data: flush held-back bytes and a final line that had no newline.
        let mut tail = std::mem::take(&mut *self.buffer_guard());
        tail.push_str(&utf8.finish());
        if !tail.trim().is_empty() {
            tail.push('\n');
            let decoded = decoder.decode(&tail);
            self.apply_events(decoded.events, callbacks, &mut acc)?;
        }

        if let Some(reporter) = &self.reporter {
            reporter.event(RelayEvent::ResponseReceived {
                provider: provider.to_string(),
                bytes: received,
            });
        }
        Ok((acc.into_result(), LoopExit::Eof))
    }

    /// Appends `text` to the buffer, decodes it and keeps the remainder.
    fn decode_appended(&self, decoder: &dyn StreamDecoder, text: &str) -> Vec<SemanticEvent> {
        let mut buffer = self.buffer_guard();
        buffer.push_str(text);
        let decoded = decoder.decode(&buffer);
        *buffer = decoded.remainder;
        decoded.events
    }

    fn apply_events(
        &self,
        events: Vec<SemanticEvent>,
        callbacks: &dyn StreamCallbacks,
        acc: &mut Accumulated,
    ) -> Result<(), StreamError> {
        for event in events {
            trace!(kind = event.kind(), "stream event");
            match event {
                SemanticEvent::Token { content } => {
                    acc.content.push_str(&content);
                    callbacks.on_token(&content).map_err(callback_failed)?;
                }
                SemanticEvent::Thinking { content } => {
                    acc.thinking.push_str(&content);
                    let formatted = self.config.thinking_format.apply(&content);
                    callbacks.on_thinking(&formatted).map_err(callback_failed)?;
                }
                SemanticEvent::ToolCall(call) => {
                    acc.tool_calls.push(call.clone());
                    callbacks.on_tool_call(&call).map_err(callback_failed)?;
                    if let Some(dispatcher) = &self.dispatcher {
                        dispatcher.dispatch(call);
                    }
                }
                SemanticEvent::Finish { reason } => acc.last_finish = Some(reason),
                SemanticEvent::Error { data } => return Err(StreamError::provider(data)),
            }
        }
        Ok(())
    }

    fn buffer_guard(&self) -> MutexGuard<'_, String> {
        self.buffer.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

fn callback_failed(err: crate::callbacks::CallbackError) -> StreamError {
    StreamError::callback(err.as_ref())
}
