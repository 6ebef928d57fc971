use serde::Deserialize;
use serde_json::Value;

use super::{StreamDecoder, parse_json, sse_data};
use crate::event::{SemanticEvent, ToolArguments, ToolCall};

const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI/DeepSeek-compatible decoder: `data:` lines carrying `choices[0].delta`.
///
/// Tool calls are emitted per fragment with the raw `arguments` text as sent.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeltaSseDecoder;

impl StreamDecoder for DeltaSseDecoder {
    fn decode_line(&self, line: &str, events: &mut Vec<SemanticEvent>) {
        let Some(data) = sse_data(line) else {
            return;
        };
        if data.is_empty() || data == DONE_SENTINEL {
            return;
        }
        let Some(value) = parse_json(data) else {
            return;
        };

        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            events.push(SemanticEvent::Error {
                data: error.clone(),
            });
            return;
        }

        let Some(choice) = value.pointer("/choices/0") else {
            return;
        };

        if let Some(reasoning) = non_empty_str(choice.pointer("/delta/reasoning_content")) {
            events.push(SemanticEvent::thinking(reasoning));
        }
        if let Some(content) = non_empty_str(choice.pointer("/delta/content")) {
            events.push(SemanticEvent::token(content));
        }
        if let Some(tool_calls) = choice.pointer("/delta/tool_calls").and_then(|v| v.as_array()) {
            for raw in tool_calls {
                match serde_json::from_value::<DeltaToolCall>(raw.clone()) {
                    Ok(DeltaToolCall {
                        id,
                        function: Some(function),
                    }) => events.push(SemanticEvent::ToolCall(ToolCall::new(
                        id,
                        function.name.unwrap_or_default(),
                        ToolArguments::Raw(function.arguments.unwrap_or_default()),
                    ))),
                    Ok(_) => {}
                    Err(err) => tracing::trace!(error = %err, "skipping malformed tool call delta"),
                }
            }
        }
        if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            events.push(SemanticEvent::finish(reason));
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
struct DeltaToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<DeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct DeltaFunction {
    // Continuation fragments may send `null` here rather than omit the field.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(buffer: &str) -> crate::decode::Decoded {
        DeltaSseDecoder.decode(buffer)
    }

    #[test]
    fn done_fixture_yields_single_token_and_consumes_buffer() {
        let decoded = decode("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n");
        assert_eq!(decoded.events, vec![SemanticEvent::token("Hi")]);
        assert_eq!(decoded.remainder, "");
    }

    #[test]
    fn partial_line_is_left_in_remainder() {
        let decoded = decode("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {\"choi");
        assert_eq!(decoded.events, vec![SemanticEvent::token("Hi")]);
        assert_eq!(decoded.remainder, "data: {\"choi");
    }

    #[test]
    fn tool_call_fragments_are_emitted_unmerged() {
        let buffer = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":null,\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"get_weather\",\"arguments\":\"\"}}]},\"finish_reason\":null}]}\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"city\\\":\"}}]},\"finish_reason\":null}]}\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"Tokyo\\\"}\"}}]},\"finish_reason\":null}]}\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n",
        );
        let events = decode(buffer).events;
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            SemanticEvent::ToolCall(ToolCall::new(
                Some("call_1".into()),
                "get_weather",
                ToolArguments::Raw(String::new())
            ))
        );
        assert_eq!(
            events[1],
            SemanticEvent::ToolCall(ToolCall::new(None, "", ToolArguments::Raw("{\"city\":".into())))
        );
        assert_eq!(events[3], SemanticEvent::finish("tool_calls"));
    }

    #[test]
    fn null_id_and_name_on_continuation_fragment_keep_arguments() {
        let events = decode(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":null,\"function\":{\"name\":null,\"arguments\":\"{\\\"q\\\":1}\"}}]}}]}\n",
        )
        .events;
        assert_eq!(
            events,
            vec![SemanticEvent::ToolCall(ToolCall::new(
                None,
                "",
                ToolArguments::Raw("{\"q\":1}".into())
            ))]
        );
    }

    #[test]
    fn reasoning_content_becomes_thinking() {
        let events = decode(
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"Let me think\",\"content\":null}}]}\n",
        )
        .events;
        assert_eq!(events, vec![SemanticEvent::thinking("Let me think")]);
    }

    #[test]
    fn top_level_error_object_becomes_error_event() {
        let events = decode("data: {\"error\":{\"message\":\"rate limited\",\"code\":429}}\n").events;
        assert!(matches!(
            &events[..],
            [SemanticEvent::Error { data }] if data["code"] == 429
        ));
    }

    #[test]
    fn empty_content_and_non_data_lines_yield_nothing() {
        let events = decode(": keep-alive\nevent: ping\ndata: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n").events;
        assert!(events.is_empty());
    }
}
