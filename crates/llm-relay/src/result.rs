use crate::event::ToolCall;

/// Reason reported in every `StreamResult` produced by a normal loop exit.
pub const DEFAULT_FINISH_REASON: &str = "stop";

/// Aggregated output of one `handle_stream` invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamResult {
    /// Token fragments concatenated in arrival order.
    pub content: String,
    /// Tool-call events in arrival order (fragments are not merged).
    pub tool_calls: Vec<ToolCall>,
    /// Thinking fragments concatenated in arrival order, before display formatting.
    pub thinking_content: String,
    /// Always `stop`; the provider's own reason is logged but not surfaced.
    pub finish_reason: String,
}

impl Default for StreamResult {
    fn default() -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            thinking_content: String::new(),
            finish_reason: DEFAULT_FINISH_REASON.to_string(),
        }
    }
}

impl StreamResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
