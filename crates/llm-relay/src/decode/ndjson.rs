use serde_json::Value;

use super::{StreamDecoder, parse_json};
use crate::event::{SemanticEvent, ToolArguments, ToolCall};

/// Gemini-compatible decoder: one JSON document per line, no `data:` prefix.
#[derive(Clone, Copy, Debug, Default)]
pub struct NdjsonDecoder;

impl StreamDecoder for NdjsonDecoder {
    fn decode_line(&self, line: &str, events: &mut Vec<SemanticEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let Some(value) = parse_json(line) else {
            return;
        };

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            events.push(SemanticEvent::Error {
                data: error.clone(),
            });
            return;
        }

        let Some(candidate) = value.pointer("/candidates/0") else {
            return;
        };
        if let Some(parts) = candidate.pointer("/content/parts").and_then(|v| v.as_array()) {
            for part in parts {
                decode_part(part, events);
            }
        }
        if let Some(reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
            events.push(SemanticEvent::finish(reason));
        }
    }
}

fn decode_part(part: &Value, events: &mut Vec<SemanticEvent>) {
    if let Some(call) = part.get("functionCall") {
        let id = call.get("id").and_then(|v| v.as_str()).map(String::from);
        let name = call.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        let args = call
            .get("args")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        events.push(SemanticEvent::ToolCall(ToolCall::new(
            id,
            name,
            ToolArguments::Json(args),
        )));
        return;
    }
    let Some(text) = part.get("text").and_then(|v| v.as_str()).filter(|t| !t.is_empty()) else {
        return;
    };
    if part.get("thought").and_then(|v| v.as_bool()) == Some(true) {
        events.push(SemanticEvent::thinking(text));
    } else {
        events.push(SemanticEvent::token(text));
    }
}
