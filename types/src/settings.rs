//! Resolved settings model shared across crates.
//!
//! These are fully-resolved values: every field is concrete, defaults already
//! applied. Raw TOML deserialization structs (with `Option` fields) stay
//! private in `quill-config`, which resolves them into this type at the load
//! boundary. Validation is pure and synchronous; IO-backed load/save lives in
//! `quill-config` too.

use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;
use crate::provider::Provider;

/// Credentials and model choice for one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    /// Override for the API endpoint base, for gateways and self-hosted
    /// compatible servers. `None` means the provider's canonical endpoint.
    pub api_base: Option<String>,
}

impl ProviderSettings {
    #[must_use]
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            api_key: String::new(),
            model: provider.default_model_id().to_string(),
            api_base: None,
        }
    }
}

/// Per-operation instruction overrides. Empty or whitespace-only overrides
/// count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOverrides {
    pub rephrase: Option<String>,
    pub summarize: Option<String>,
    pub explain: Option<String>,
}

impl PromptOverrides {
    #[must_use]
    pub fn for_kind(&self, kind: OperationKind) -> Option<&str> {
        let raw = match kind {
            OperationKind::Rephrase => self.rephrase.as_deref(),
            OperationKind::Summarize => self.summarize.as_deref(),
            OperationKind::Explain => self.explain.as_deref(),
        };
        raw.map(str::trim).filter(|s| !s.is_empty())
    }
}

/// The complete user configuration.
///
/// Exactly one provider is active at a time; the other's settings are kept so
/// switching back does not lose them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub active_provider: Provider,
    pub openai: ProviderSettings,
    pub anthropic: ProviderSettings,
    pub prompts: PromptOverrides,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_provider: Provider::default(),
            openai: ProviderSettings::for_provider(Provider::OpenAI),
            anthropic: ProviderSettings::for_provider(Provider::Anthropic),
            prompts: PromptOverrides::default(),
        }
    }
}

impl Settings {
    #[must_use]
    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::OpenAI => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }

    /// Settings for whichever provider is currently active.
    #[must_use]
    pub fn active(&self) -> &ProviderSettings {
        self.provider(self.active_provider)
    }

    /// Pure validation of the active provider's configuration.
    ///
    /// A missing credential or model is reported here so callers can refuse
    /// an operation before any network attempt.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let name = self.active_provider.display_name();
        let active = self.active();

        if active.api_key.trim().is_empty() {
            errors.push(format!("{name} API key is not configured"));
        }
        if active.model.trim().is_empty() {
            errors.push(format!("{name} model is not set"));
        } else if let Err(err) =
            crate::provider::ModelName::parse(self.active_provider, &active.model)
        {
            errors.push(err.to_string());
        }

        ValidationReport { errors }
    }
}

/// Result of validating a [`Settings`] value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<String>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}
