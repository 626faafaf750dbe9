use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Token accounting reported by a backend (or estimated when it reports none).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}

/// The provider family selected by a server's `model` setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI GPT-4o.
    #[default]
    Gpt4o,
    /// Anthropic Claude.
    Claude,
    /// Google Gemini.
    Gemini,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Gpt4o, BackendKind::Claude, BackendKind::Gemini];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Gpt4o => "gpt4o",
            BackendKind::Claude => "claude",
            BackendKind::Gemini => "gemini",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BackendKind::Gpt4o => "OpenAI's GPT-4o model",
            BackendKind::Claude => "Anthropic's Claude 3.7 Sonnet model",
            BackendKind::Gemini => "Google's Gemini 2.0 Flash model",
        }
    }

    /// Lenient mapping used when reading stored configuration: unknown
    /// identifiers fall back to the default provider.
    pub fn from_config_value(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpt4o" => Ok(BackendKind::Gpt4o),
            "claude" => Ok(BackendKind::Claude),
            "gemini" => Ok(BackendKind::Gemini),
            other => Err(BackendError::UnknownBackend(other.to_string())),
        }
    }
}

/// Successful `translate` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendTranslation {
    pub translation: String,
    pub tokens: TokenUsage,
}

/// Structured backend failure. The pipeline classifies failures from the
/// variant, never from the message text.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{provider} rate limit exceeded: {message}")]
    RateLimited {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned an unusable response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("no API key configured for {0}")]
    MissingApiKey(BackendKind),

    #[error("unknown backend: {0}")]
    UnknownBackend(String),
}

impl BackendError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. })
    }
}
