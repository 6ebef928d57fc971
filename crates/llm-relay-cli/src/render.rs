//! Terminal output for decoded stream events.

use std::io::Write;
use std::sync::Mutex;

use llm_relay::callbacks::{CallbackResult, StreamCallbacks};
use llm_relay::{StreamError, StreamResult, ThinkingTracker, ToolCall, ToolCallAccumulator};

type Writer = Box<dyn Write + Send>;

/// Prints tokens to `out` and thinking, tool calls and errors to `err`.
///
/// Write failures (for example a closed pipe) abort the stream.
pub struct TerminalCallbacks {
    out: Mutex<Writer>,
    err: Mutex<Writer>,
    show_thinking: bool,
    merged: Mutex<ToolCallAccumulator>,
    tracker: ThinkingTracker,
}

impl TerminalCallbacks {
    pub fn new(out: Writer, err: Writer, show_thinking: bool, tracker: ThinkingTracker) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
            show_thinking,
            merged: Mutex::new(ToolCallAccumulator::new()),
            tracker,
        }
    }

    pub fn stdio(show_thinking: bool, tracker: ThinkingTracker) -> Self {
        Self::new(
            Box::new(std::io::stdout()),
            Box::new(std::io::stderr()),
            show_thinking,
            tracker,
        )
    }

    /// Tool calls seen so far with streamed fragments merged.
    pub fn merged_tool_calls(&self) -> Vec<ToolCall> {
        let mut merged = self.merged.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *merged).finish()
    }

    fn write_err(&self, text: &str) -> std::io::Result<()> {
        let mut err = self.err.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(err, "{text}")?;
        err.flush()
    }
}

impl StreamCallbacks for TerminalCallbacks {
    fn on_token(&self, text: &str) -> CallbackResult {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn on_thinking(&self, formatted: &str) -> CallbackResult {
        if self.show_thinking {
            self.write_err(formatted)?;
        }
        Ok(())
    }

    fn on_tool_call(&self, call: &ToolCall) -> CallbackResult {
        self.merged
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(call);
        if !call.name.is_empty() {
            self.tracker.set_action(format!("Calling {}", call.name));
            self.write_err(&format!("[tool] {}", call.name))?;
        }
        Ok(())
    }

    fn on_complete(&self, result: &StreamResult) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if !result.content.is_empty() && !result.content.ends_with('\n') {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    fn on_error(&self, error: &StreamError) {
        let _ = self.write_err(&format!("stream error: {error}"));
    }
}
