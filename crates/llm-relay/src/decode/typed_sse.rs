use serde_json::Value;

use super::{StreamDecoder, parse_json, sse_data};
use crate::event::{SemanticEvent, ToolArguments, ToolCall};

/// Anthropic-compatible decoder for typed SSE events.
///
/// `event:` lines are ignored; the `type` field inside each `data:` payload
/// carries the same information. A `tool_use` block is reported once, at
/// `content_block_start`, with the input known at that point.
#[derive(Clone, Copy, Debug, Default)]
pub struct TypedSseDecoder;

impl StreamDecoder for TypedSseDecoder {
    fn decode_line(&self, line: &str, events: &mut Vec<SemanticEvent>) {
        let Some(data) = sse_data(line).filter(|d| !d.is_empty()) else {
            return;
        };
        let Some(value) = parse_json(data) else {
            return;
        };

        match value.get("type").and_then(|v| v.as_str()) {
            Some("content_block_delta") => {
                let delta = value.get("delta");
                if let Some(text) = str_field(delta, "text") {
                    events.push(SemanticEvent::token(text));
                } else if let Some(thinking) = str_field(delta, "thinking") {
                    events.push(SemanticEvent::thinking(thinking));
                }
            }
            Some("content_block_start") => {
                let Some(block) = value.get("content_block") else {
                    return;
                };
                if block.get("type").and_then(|v| v.as_str()) != Some("tool_use") {
                    return;
                }
                let id = block.get("id").and_then(|v| v.as_str()).map(String::from);
                let name = block.get("name").and_then(|v| v.as_str()).unwrap_or_default();
                let input = block
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                events.push(SemanticEvent::ToolCall(ToolCall::new(
                    id,
                    name,
                    ToolArguments::Json(input),
                )));
            }
            Some("message_stop") => events.push(SemanticEvent::finish("stop")),
            Some("error") => events.push(SemanticEvent::Error {
                data: value.get("error").cloned().unwrap_or_else(|| value.clone()),
            }),
            _ => {}
        }
    }
}

fn str_field<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a str> {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"role\":\"assistant\",\"content\":[]}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"Checking weather.\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Sure\"}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":2,\"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_1\",\"name\":\"get_weather\",\"input\":{}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":2,\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":\"{\\\"city\\\": \\\"Paris\\\"}\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    #[test]
    fn decodes_full_message() {
        let decoded = TypedSseDecoder.decode(MESSAGE);
        assert_eq!(
            decoded.events,
            vec![
                SemanticEvent::thinking("Checking weather."),
                SemanticEvent::token("Sure"),
                SemanticEvent::ToolCall(ToolCall::new(
                    Some("toolu_1".into()),
                    "get_weather",
                    ToolArguments::Json(serde_json::json!({}))
                )),
                SemanticEvent::finish("stop"),
            ]
        );
        assert!(decoded.remainder.is_empty());
    }

    #[test]
    fn error_event_carries_error_payload() {
        let decoded = TypedSseDecoder.decode(
            "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n",
        );
        assert_eq!(
            decoded.events,
            vec![SemanticEvent::Error {
                data: serde_json::json!({"type":"overloaded_error","message":"Overloaded"})
            }]
        );
    }

    #[test]
    fn non_tool_block_start_is_ignored() {
        let decoded = TypedSseDecoder.decode(
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
        );
        assert!(decoded.events.is_empty());
    }
}
