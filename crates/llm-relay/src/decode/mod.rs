//! Provider decoders.
//!
//! Each decoder is a pure function from a text buffer to the semantic events
//! found in its complete lines plus the unconsumed remainder. The caller keeps
//! the remainder and prepends it to the next chunk's text; nothing is ever
//! re-parsed from the start of the stream.
//!
//! Lines that fail to parse as JSON are skipped without an event. A chunk
//! boundary can fall inside a line, but the remainder mechanism only hands a
//! line to the decoder once its terminating newline has arrived.

mod delta_sse;
mod ndjson;
mod typed_sse;

pub use delta_sse::DeltaSseDecoder;
pub use ndjson::NdjsonDecoder;
pub use typed_sse::TypedSseDecoder;

use crate::event::SemanticEvent;
use crate::provider::ProviderKind;

/// Output of one decode pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decoded {
    pub events: Vec<SemanticEvent>,
    /// Trailing partial line to carry into the next pass.
    pub remainder: String,
}

/// One implementation per wire format. Implementations hold no state.
pub trait StreamDecoder: Send + Sync {
    /// Maps one complete line (without its newline) to zero or more events.
    fn decode_line(&self, line: &str, events: &mut Vec<SemanticEvent>);

    fn decode(&self, buffer: &str) -> Decoded {
        let (lines, remainder) = split_complete_lines(buffer);
        let mut events = Vec::new();
        for line in lines {
            self.decode_line(line, &mut events);
        }
        Decoded {
            events,
            remainder: remainder.to_string(),
        }
    }
}

/// Decodes `buffer` for the given provider.
pub fn decode(buffer: &str, provider: ProviderKind) -> Decoded {
    provider.decode(buffer)
}

/// Splits `buffer` into complete lines and the trailing partial line.
///
/// A trailing `\r` is stripped from complete lines so CRLF streams decode the
/// same as LF streams.
pub(crate) fn split_complete_lines(buffer: &str) -> (Vec<&str>, &str) {
    let Some(last_newline) = buffer.rfind('\n') else {
        return (Vec::new(), buffer);
    };
    let lines = buffer[..last_newline]
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    (lines, &buffer[last_newline + 1..])
}

/// Returns the payload of an SSE `data:` line, if this is one.
pub(crate) fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

pub(crate) fn parse_json(text: &str) -> Option<serde_json::Value> {
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::trace!(error = %err, "skipping unparseable stream line");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_trailing_partial_line() {
        let (lines, rest) = split_complete_lines("a\nb\r\nc");
        assert_eq!(lines, vec!["a", "b"]);
        assert_eq!(rest, "c");
    }

    #[test]
    fn split_without_newline_consumes_nothing() {
        let (lines, rest) = split_complete_lines("data: {\"par");
        assert!(lines.is_empty());
        assert_eq!(rest, "data: {\"par");
    }

    #[test]
    fn split_with_trailing_newline_leaves_empty_remainder() {
        let (lines, rest) = split_complete_lines("x\n\n");
        assert_eq!(lines, vec!["x", ""]);
        assert_eq!(rest, "");
    }

    #[test]
    fn sse_data_accepts_missing_space() {
        assert_eq!(sse_data("data:{}"), Some("{}"));
        assert_eq!(sse_data("data: {}"), Some("{}"));
        assert_eq!(sse_data("event: ping"), None);
    }

    fn one_token_payload(provider: ProviderKind) -> &'static str {
        match provider {
            ProviderKind::OpenAi => "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            ProviderKind::Anthropic => {
                "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n\n"
            }
            ProviderKind::Gemini => {
                "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}],\"role\":\"model\"}}]}\n"
            }
        }
    }

    #[test]
    fn single_content_delta_yields_one_token_for_every_provider() {
        for provider in [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Gemini] {
            let decoded = decode(one_token_payload(provider), provider);
            assert_eq!(
                decoded.events,
                vec![SemanticEvent::token("Hello")],
                "provider {provider}"
            );
            assert!(decoded.remainder.is_empty(), "provider {provider}");
        }
    }

    #[test]
    fn invalid_json_line_is_dropped_for_every_provider() {
        for provider in [ProviderKind::OpenAi, ProviderKind::Anthropic, ProviderKind::Gemini] {
            let payload = match provider {
                ProviderKind::Gemini => "{not json}\n".to_string(),
                _ => "data: {not json}\n".to_string(),
            };
            let decoded = decode(&payload, provider);
            assert!(decoded.events.is_empty(), "provider {provider}");
            assert!(decoded.remainder.is_empty(), "provider {provider}");
        }
    }

    #[test]
    fn remainder_threaded_through_passes_matches_single_pass() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n\n";
        let whole = decode(payload, ProviderKind::OpenAi).events;
        for split in 0..=payload.len() {
            let first = decode(&payload[..split], ProviderKind::OpenAi);
            let mut buffer = first.remainder;
            buffer.push_str(&payload[split..]);
            let second = decode(&buffer, ProviderKind::OpenAi);
            let mut events = first.events;
            events.extend(second.events);
            assert_eq!(events, whole, "split at {split}");
            assert!(second.remainder.is_empty());
        }
    }
}
