use std::time::Duration;

use crate::errors::RelayError;
use crate::provider::ProviderKind;

const ENV_PROVIDER: &str = "LLM_RELAY_PROVIDER";
const ENV_CHAT_ID: &str = "LLM_RELAY_CHAT_ID";
const ENV_THINKING_PREFIX: &str = "LLM_RELAY_THINKING_PREFIX";
const ENV_URL: &str = "LLM_RELAY_URL";
const ENV_API_KEY: &str = "LLM_RELAY_API_KEY";
const ENV_TIMEOUT_SECS: &str = "LLM_RELAY_TIMEOUT_SECS";

/// Display transform applied to thinking text before `on_thinking`.
///
/// The accumulated `thinking_content` keeps the raw provider text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThinkingFormat {
    pub prefix: Option<String>,
}

impl ThinkingFormat {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Normalizes CRLF to LF and prepends the prefix, if any.
    pub fn apply(&self, text: &str) -> String {
        let normalized = text.replace("\r\n", "\n");
        match self.prefix.as_deref().filter(|p| !p.is_empty()) {
            Some(prefix) => format!("{prefix}{normalized}"),
            None => normalized,
        }
    }
}

/// Per-session configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    /// Wire format used when the caller does not name one explicitly.
    pub provider: ProviderKind,
    /// Conversation identifier attached to reported events.
    pub chat_id: Option<String>,
    pub thinking_format: ThinkingFormat,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            chat_id: None,
            thinking_format: ThinkingFormat::default(),
        }
    }
}

impl RelayConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Reads `LLM_RELAY_PROVIDER`, `LLM_RELAY_CHAT_ID` and
    /// `LLM_RELAY_THINKING_PREFIX`. Unset values keep their defaults.
    pub fn from_env() -> Result<Self, RelayError> {
        let mut config = Self::default();
        if let Some(provider) = env_non_empty(ENV_PROVIDER) {
            config.provider = provider.parse()?;
        }
        config.chat_id = env_non_empty(ENV_CHAT_ID);
        if let Some(prefix) = env_non_empty(ENV_THINKING_PREFIX) {
            config.thinking_format = ThinkingFormat::with_prefix(prefix);
        }
        Ok(config)
    }

    pub fn provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn thinking_format(mut self, format: ThinkingFormat) -> Self {
        self.thinking_format = format;
        self
    }
}

/// HTTP endpoint used to open a streaming response.
#[derive(Clone, Debug)]
pub struct EndpointConfig {
    pub url: String,
    /// Sent as a bearer token when non-empty.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl EndpointConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
        }
    }

    /// Builds a config from `LLM_RELAY_URL`, `LLM_RELAY_API_KEY` and
    /// `LLM_RELAY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, RelayError> {
        let url = env_non_empty(ENV_URL)
            .ok_or_else(|| RelayError::Config(format!("missing {ENV_URL}")))?;
        let mut config = Self::new(url);
        config.api_key = env_non_empty(ENV_API_KEY);
        if let Some(raw) = env_non_empty(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.parse().map_err(|_| {
                RelayError::Config(format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        let url = self.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RelayError::Config(format!(
                "endpoint url must start with http:// or https://: {url}"
            )));
        }
        if self.timeout.is_zero() {
            return Err(RelayError::Config("endpoint timeout must be greater than 0".into()));
        }
        Ok(())
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
