use std::fmt;
use std::str::FromStr;

use crate::decode::{Decoded, DeltaSseDecoder, NdjsonDecoder, StreamDecoder, TypedSseDecoder};
use crate::errors::RelayError;

/// Wire encoding family of a provider's streaming response.
///
/// Selected once per stream and never changed mid-stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `data:` lines carrying `choices[0].delta` (also DeepSeek).
    OpenAi,
    /// Anthropic-compatible typed events (`content_block_delta`, `message_stop`, ...).
    Anthropic,
    /// Gemini-compatible newline-delimited JSON documents.
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Returns the decoder for this wire format.
    pub fn decoder(&self) -> &'static dyn StreamDecoder {
        match self {
            Self::OpenAi => &DeltaSseDecoder,
            Self::Anthropic => &TypedSseDecoder,
            Self::Gemini => &NdjsonDecoder,
        }
    }

    /// Decodes `buffer` with this provider's decoder.
    pub fn decode(&self, buffer: &str) -> Decoded {
        self.decoder().decode(buffer)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "deepseek" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(RelayError::Validation(format!("unknown provider: {other}"))),
        }
    }
}
