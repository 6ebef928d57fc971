use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arguments attached to a tool call.
///
/// Delta-style providers stream arguments as raw JSON text fragments; others
/// deliver an already structured object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolArguments {
    Raw(String),
    Json(Value),
}

impl ToolArguments {
    /// Returns the arguments as JSON, parsing raw text when it is valid JSON.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Raw(text) if text.trim().is_empty() => Some(Value::Object(Default::default())),
            Self::Raw(text) => serde_json::from_str(text).ok(),
            Self::Json(value) => Some(value.clone()),
        }
    }
}

impl Default for ToolArguments {
    fn default() -> Self {
        Self::Raw(String::new())
    }
}

/// A request to invoke a named tool.
///
/// Not guaranteed to be complete: delta providers emit one `ToolCall` per
/// fragment. Use [`ToolCallAccumulator`] to merge them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self {
            id: id.filter(|id| !id.is_empty()),
            name: name.into(),
            arguments,
        }
    }
}

/// Provider-agnostic unit decoded from a response stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SemanticEvent {
    /// Answer content fragment, appended in arrival order.
    Token { content: String },
    /// Reasoning or narration fragment; not part of the final answer.
    Thinking { content: String },
    ToolCall(ToolCall),
    /// Provider stop reason. Informational; the read loop ends on transport EOF.
    Finish { reason: String },
    /// In-band provider failure.
    Error { data: Value },
}

impl SemanticEvent {
    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking {
            content: content.into(),
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Self::Finish {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Thinking { .. } => "thinking",
            Self::ToolCall(_) => "tool_call",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
        }
    }
}

/// Merges streamed tool-call fragments into complete calls, keyed by id.
///
/// A fragment whose id was seen before extends that call. A fragment without
/// an id extends the most recent call unless it names a tool, in which case
/// it opens a new one.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &ToolCall) {
        let target = match fragment.id.as_deref() {
            Some(id) => self
                .calls
                .iter_mut()
                .rev()
                .find(|call| call.id.as_deref() == Some(id)),
            None if fragment.name.is_empty() => self.calls.last_mut(),
            None => None,
        };
        match target {
            Some(call) => merge_fragment(call, fragment),
            None => self.calls.push(fragment.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Returns the merged calls, parsing raw arguments to JSON where they are valid.
    pub fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|mut call| {
                if let ToolArguments::Raw(_) = call.arguments
                    && let Some(value) = call.arguments.to_json()
                {
                    call.arguments = ToolArguments::Json(value);
                }
                call
            })
            .collect()
    }
}

fn merge_fragment(call: &mut ToolCall, fragment: &ToolCall) {
    if call.name.is_empty() {
        call.name.clone_from(&fragment.name);
    }
    match (&mut call.arguments, &fragment.arguments) {
        (ToolArguments::Raw(acc), ToolArguments::Raw(more)) => acc.push_str(more),
        (_, ToolArguments::Raw(more)) if more.is_empty() => {}
        (slot, args) => *slot = args.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(id: Option<&str>, name: &str, args: &str) -> ToolCall {
        ToolCall::new(id.map(String::from), name, ToolArguments::Raw(args.into()))
    }

    #[test]
    fn accumulator_merges_delta_fragments_by_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(Some("call_1"), "get_weather", ""));
        acc.push(&fragment(None, "", "{\"city\":"));
        acc.push(&fragment(None, "", "\"Tokyo\"}"));
        acc.push(&fragment(Some("call_2"), "get_time", "{}"));

        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(
            calls[0].arguments,
            ToolArguments::Json(serde_json::json!({"city": "Tokyo"}))
        );
        assert_eq!(calls[1].id.as_deref(), Some("call_2"));
    }

    #[test]
    fn fragments_repeating_id_and_name_extend_one_call() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(Some("call_1"), "get_weather", "{\"city\":"));
        acc.push(&fragment(Some("call_2"), "get_time", "{}"));
        acc.push(&fragment(Some("call_1"), "get_weather", "\"Tokyo\"}"));
        assert_eq!(acc.len(), 2);

        let calls = acc.finish();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].arguments,
            ToolArguments::Json(serde_json::json!({"city": "Tokyo"}))
        );
        assert_eq!(calls[1].arguments, ToolArguments::Json(serde_json::json!({})));
    }

    #[test]
    fn structured_calls_without_id_stay_separate() {
        let json = |v: serde_json::Value| ToolCall::new(None, "lookup", ToolArguments::Json(v));
        let mut acc = ToolCallAccumulator::new();
        acc.push(&json(serde_json::json!({"q": "a"})));
        acc.push(&json(serde_json::json!({"q": "b"})));
        let calls = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].arguments, ToolArguments::Json(serde_json::json!({"q": "b"})));
    }

    #[test]
    fn accumulator_keeps_unparseable_arguments_raw() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&fragment(Some("c"), "t", "{\"truncated"));
        let calls = acc.finish();
        assert_eq!(calls[0].arguments, ToolArguments::Raw("{\"truncated".into()));
    }

    #[test]
    fn empty_id_is_normalized_to_none() {
        let call = ToolCall::new(Some(String::new()), "t", ToolArguments::default());
        assert_eq!(call.id, None);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(SemanticEvent::token("Hi")).expect("serialize");
        assert_eq!(value, serde_json::json!({"type": "token", "content": "Hi"}));
    }
}
