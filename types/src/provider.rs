//! Provider enumeration, model identity, and credentials.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An AI backend. Exactly one provider is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Anthropic,
}

const PROVIDER_PARSE_VALUES: &[&str] = &["openai", "gpt", "chatgpt", "anthropic", "claude"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid provider '{raw}'; expected one of: {PROVIDER_PARSE_VALUES:?}")]
pub struct ProviderParseError {
    raw: String,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Anthropic => "Anthropic",
        }
    }

    /// Conventional environment variable consulted when no key is configured.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Provider::OpenAI => "OPENAI_API_KEY",
            Provider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    #[must_use]
    pub const fn default_model_id(self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o-mini",
            Provider::Anthropic => "claude-3-5-haiku-latest",
        }
    }

    #[must_use]
    pub fn default_model(self) -> ModelName {
        ModelName::parse(self, self.default_model_id())
            .expect("default model ids are valid for their provider")
    }

    pub fn parse(s: &str) -> Result<Self, ProviderParseError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "gpt" | "chatgpt" => Ok(Provider::OpenAI),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(ProviderParseError {
                raw: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Provider] {
        &[Provider::OpenAI, Provider::Anthropic]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModelParseError {
    #[error("model name cannot be empty")]
    EmptyInput,
    #[error("OpenAI model must start with gpt- or o (got {0})")]
    OpenAIPrefix(String),
    #[error("Anthropic model must start with claude- (got {0})")]
    AnthropicPrefix(String),
}

/// A provider-tagged model identifier.
///
/// The constructor enforces that the identifier plausibly belongs to the
/// provider, so a mismatched provider/model pair is impossible to hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelName {
    provider: Provider,
    #[serde(rename = "model")]
    name: String,
}

impl ModelName {
    pub fn parse(provider: Provider, raw: &str) -> Result<Self, ModelParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ModelParseError::EmptyInput);
        }

        let lower = trimmed.to_ascii_lowercase();
        match provider {
            Provider::OpenAI if !lower.starts_with("gpt-") && !lower.starts_with('o') => {
                return Err(ModelParseError::OpenAIPrefix(trimmed.to_string()));
            }
            Provider::Anthropic if !lower.starts_with("claude-") => {
                return Err(ModelParseError::AnthropicPrefix(trimmed.to_string()));
            }
            _ => {}
        }

        Ok(Self {
            provider,
            name: trimmed.to_string(),
        })
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Per-provider credential.
///
/// The `Debug` impl redacts the secret so keys cannot leak through logs.
#[derive(Clone, PartialEq, Eq)]
pub enum ApiKey {
    OpenAI(String),
    Anthropic(String),
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKey::OpenAI(_) => write!(f, "ApiKey::OpenAI(<redacted>)"),
            ApiKey::Anthropic(_) => write!(f, "ApiKey::Anthropic(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No API key configured for {}", .provider.display_name())]
pub struct MissingKeyError {
    provider: Provider,
}

impl MissingKeyError {
    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.provider
    }
}

impl ApiKey {
    /// Build a credential for `provider`, rejecting empty input so an
    /// operation can never reach the network without a key.
    pub fn new(provider: Provider, raw: impl Into<String>) -> Result<Self, MissingKeyError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(MissingKeyError { provider });
        }
        Ok(match provider {
            Provider::OpenAI => ApiKey::OpenAI(raw),
            Provider::Anthropic => ApiKey::Anthropic(raw),
        })
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        match self {
            ApiKey::OpenAI(_) => Provider::OpenAI,
            ApiKey::Anthropic(_) => Provider::Anthropic,
        }
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        match self {
            ApiKey::OpenAI(key) | ApiKey::Anthropic(key) => key,
        }
    }
}
