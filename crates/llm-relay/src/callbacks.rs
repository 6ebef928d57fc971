use crate::errors::StreamError;
use crate::event::ToolCall;
use crate::result::StreamResult;

pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;
pub type CallbackResult = Result<(), CallbackError>;

/// Receiver of decoded stream events.
///
/// Every method has a no-op default. An `Err` from `on_token`, `on_thinking`
/// or `on_tool_call` aborts the stream with a `callback_failed` error.
pub trait StreamCallbacks: Send + Sync {
    fn on_token(&self, _text: &str) -> CallbackResult {
        Ok(())
    }

    /// Receives thinking text after the session's display formatting.
    fn on_thinking(&self, _formatted: &str) -> CallbackResult {
        Ok(())
    }

    /// Called for every tool-call event, fragments included. The read loop
    /// does not wait for any work started here.
    fn on_tool_call(&self, _call: &ToolCall) -> CallbackResult {
        Ok(())
    }

    fn on_complete(&self, _result: &StreamResult) {}

    fn on_error(&self, _error: &StreamError) {}
}

/// Callbacks that ignore every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCallbacks;

impl StreamCallbacks for NoCallbacks {}

type TextFn = Box<dyn Fn(&str) + Send + Sync>;

/// Closure-based callbacks.
///
/// ```
/// use llm_relay::callbacks::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .with_token(|text| print!("{text}"))
///     .with_error(|err| eprintln!("stream failed: {err}"));
/// # let _ = callbacks;
/// ```
#[derive(Default)]
pub struct Callbacks {
    token: Option<TextFn>,
    thinking: Option<TextFn>,
    tool_call: Option<Box<dyn Fn(&ToolCall) + Send + Sync>>,
    complete: Option<Box<dyn Fn(&StreamResult) + Send + Sync>>,
    error: Option<Box<dyn Fn(&StreamError) + Send + Sync>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.token = Some(Box::new(f));
        self
    }

    pub fn with_thinking(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.thinking = Some(Box::new(f));
        self
    }

    pub fn with_tool_call(mut self, f: impl Fn(&ToolCall) + Send + Sync + 'static) -> Self {
        self.tool_call = Some(Box::new(f));
        self
    }

    pub fn with_complete(mut self, f: impl Fn(&StreamResult) + Send + Sync + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl StreamCallbacks for Callbacks {
    fn on_token(&self, text: &str) -> CallbackResult {
        if let Some(f) = &self.token {
            f(text);
        }
        Ok(())
    }

    fn on_thinking(&self, formatted: &str) -> CallbackResult {
        if let Some(f) = &self.thinking {
            f(formatted);
        }
        Ok(())
    }

    fn on_tool_call(&self, call: &ToolCall) -> CallbackResult {
        if let Some(f) = &self.tool_call {
            f(call);
        }
        Ok(())
    }

    fn on_complete(&self, result: &StreamResult) {
        if let Some(f) = &self.complete {
            f(result);
        }
    }

    fn on_error(&self, error: &StreamError) {
        if let Some(f) = &self.error {
            f(error);
        }
    }
}
