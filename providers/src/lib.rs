//! AI provider clients with a unified completion contract.
//!
//! # Architecture
//!
//! The crate is organized around a provider dispatch pattern:
//!
//! - [`ProviderClient`] - selected from settings, dispatches to the
//!   provider-specific implementation
//! - [`openai`] - OpenAI Chat Completions API client
//! - [`anthropic`] - Anthropic Messages API client
//!
//! A client is stateless and makes exactly one outbound call per invocation.
//! There are no retries here: retry is a user-visible action one layer up, so
//! every failure is surfaced instead of silently re-attempted.
//!
//! # Error Handling
//!
//! Provider and network errors never escape as panics or raw `Err` values
//! past [`ProviderClient::complete`]; they are converted into
//! [`OperationOutcome::Failure`] values whose message text is part of the
//! contract with the page UI (see [`ProviderError`]).

use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

use quill_types::{
    ApiKey, MissingKeyError, ModelName, ModelParseError, NonEmptyString, OperationKind,
    OperationOutcome, Provider, Settings,
};

/// OpenAI Chat Completions API client.
pub mod openai;

/// Anthropic Messages API client.
pub mod anthropic;

/// Canonical OpenAI Chat Completions endpoint.
pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
/// Canonical Anthropic Messages endpoint.
pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

const CONNECT_TIMEOUT_SECS: u64 = 10;
const MAX_ERROR_BODY_BYTES: usize = 16 * 1024;

/// Shared HTTP client. Redirects are refused so a credential-bearing request
/// can never be replayed against a different host. Plain HTTP stays allowed
/// because `api_base` overrides legitimately point at local gateways.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build HTTP client: {e}. Falling back to defaults.");
                reqwest::Client::new()
            })
    })
}

/// Failure classes for a provider call.
///
/// The `Display` text of each variant is forwarded verbatim into the modal's
/// error state, so the wording here is contract, not decoration.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Caught before any network attempt; never retried automatically.
    #[error(transparent)]
    MissingCredential(#[from] MissingKeyError),
    /// The configured model identifier does not belong to the provider.
    #[error(transparent)]
    InvalidModel(#[from] ModelParseError),
    /// Nothing came back at all: DNS, connect, or TLS failure.
    #[error("Network error: {source}")]
    Transport { source: reqwest::Error },
    /// A response was obtained but its status is outside the success range.
    #[error("{} API Error: {status}", .provider.display_name())]
    Protocol {
        provider: Provider,
        status: reqwest::StatusCode,
    },
    /// The response parsed but carried no usable output field.
    #[error("No response from {} API", .provider.display_name())]
    EmptyResult { provider: Provider },
}

impl ProviderError {
    /// Configuration problems are surfaced as validation messages and must
    /// never be presented as retryable network failures.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProviderError::MissingCredential(_) | ProviderError::InvalidModel(_)
        )
    }
}

/// One normalized completion request: the operation, the text it applies to,
/// and optional secondary context (explain only).
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub kind: OperationKind,
    pub text: &'a NonEmptyString,
    pub context: Option<&'a str>,
}

impl<'a> CompletionRequest<'a> {
    #[must_use]
    pub fn new(kind: OperationKind, text: &'a NonEmptyString) -> Self {
        Self {
            kind,
            text,
            context: None,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: Option<&'a str>) -> Self {
        self.context = context;
        self
    }

    /// The user-role content sent to the provider: fixed per-kind preamble
    /// plus the text, with explain context appended when present.
    #[must_use]
    pub fn user_content(&self) -> String {
        let mut content = format!("{}{}", self.kind.request_preamble(), self.text.as_str());
        if self.kind == OperationKind::Explain
            && let Some(context) = self.context.map(str::trim).filter(|c| !c.is_empty())
        {
            content.push_str("\n\nContext: ");
            content.push_str(context);
        }
        content
    }
}

/// Everything a provider module needs for one call, resolved and validated
/// up front so configuration errors fail before the request is built.
#[derive(Debug)]
pub(crate) struct ResolvedCall {
    pub key: ApiKey,
    pub model: ModelName,
    pub endpoint: String,
    pub instruction: String,
    pub user_content: String,
}

impl ResolvedCall {
    fn resolve(
        provider: Provider,
        settings: &Settings,
        request: &CompletionRequest<'_>,
    ) -> Result<Self, ProviderError> {
        let per_provider = settings.provider(provider);
        let key = ApiKey::new(provider, per_provider.api_key.clone())?;
        let model = ModelName::parse(provider, &per_provider.model)?;

        let default_endpoint = match provider {
            Provider::OpenAI => OPENAI_CHAT_COMPLETIONS_URL,
            Provider::Anthropic => ANTHROPIC_MESSAGES_URL,
        };
        let endpoint = match per_provider.api_base.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => {
                let path = match provider {
                    Provider::OpenAI => "/v1/chat/completions",
                    Provider::Anthropic => "/v1/messages",
                };
                format!("{}{path}", base.trim_end_matches('/'))
            }
            _ => default_endpoint.to_string(),
        };

        let instruction = settings
            .prompts
            .for_kind(request.kind)
            .unwrap_or_else(|| request.kind.default_instruction())
            .to_string();

        Ok(Self {
            key,
            model,
            endpoint,
            instruction,
            user_content: request.user_content(),
        })
    }
}

/// A selected provider backend.
///
/// Selection is a pure function of the active provider tag; instances are
/// cheap and stateless, so nothing is cached that could go stale when
/// configuration changes mid-session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderClient {
    OpenAI,
    Anthropic,
}

impl ProviderClient {
    #[must_use]
    pub const fn select(settings: &Settings) -> Self {
        match settings.active_provider {
            Provider::OpenAI => ProviderClient::OpenAI,
            Provider::Anthropic => ProviderClient::Anthropic,
        }
    }

    #[must_use]
    pub const fn provider(self) -> Provider {
        match self {
            ProviderClient::OpenAI => Provider::OpenAI,
            ProviderClient::Anthropic => Provider::Anthropic,
        }
    }

    /// Execute one completion. Every failure class is folded into an
    /// [`OperationOutcome::Failure`]; this function does not error.
    pub async fn complete(
        self,
        request: &CompletionRequest<'_>,
        settings: &Settings,
    ) -> OperationOutcome {
        match self.run(request, settings).await {
            Ok(text) => OperationOutcome::success(text),
            Err(err) => {
                tracing::warn!(
                    provider = self.provider().as_str(),
                    kind = request.kind.as_str(),
                    configuration = err.is_configuration(),
                    "Provider call failed: {err}"
                );
                OperationOutcome::failure(err.to_string())
            }
        }
    }

    async fn run(
        self,
        request: &CompletionRequest<'_>,
        settings: &Settings,
    ) -> Result<String, ProviderError> {
        let call = ResolvedCall::resolve(self.provider(), settings, request)?;
        let output = match self {
            ProviderClient::OpenAI => openai::complete(&call).await?,
            ProviderClient::Anthropic => anthropic::complete(&call).await?,
        };
        Ok(output.trim().to_string())
    }
}

/// Read at most [`MAX_ERROR_BODY_BYTES`] of an error response for logging.
pub(crate) async fn read_capped_error_body(response: reqwest::Response) -> String {
    match response.bytes().await {
        Ok(body) => {
            let capped = &body[..body.len().min(MAX_ERROR_BODY_BYTES)];
            let text = String::from_utf8_lossy(capped);
            if body.len() > MAX_ERROR_BODY_BYTES {
                format!("{text}...(truncated)")
            } else {
                text.into_owned()
            }
        }
        Err(e) => format!("<unreadable body: {e}>"),
    }
}

/// Fail with [`ProviderError::Protocol`] for a non-success status, logging a
/// capped slice of the body for diagnosis.
pub(crate) async fn ensure_success(
    provider: Provider,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = read_capped_error_body(response).await;
    tracing::debug!(
        provider = provider.as_str(),
        %status,
        "Provider returned error body: {body}"
    );
    Err(ProviderError::Protocol { provider, status })
}

#[cfg(test)]
mod tests {
    use super::{CompletionRequest, ProviderClient, ResolvedCall};
    use quill_types::{NonEmptyString, OperationKind, Provider, Settings};

    fn settings_with_keys() -> Settings {
        let mut settings = Settings::default();
        settings.openai.api_key = "sk-test".to_string();
        settings.anthropic.api_key = "sk-ant-test".to_string();
        settings
    }

    #[test]
    fn select_follows_active_provider() {
        let mut settings = settings_with_keys();
        assert_eq!(ProviderClient::select(&settings), ProviderClient::OpenAI);

        settings.active_provider = Provider::Anthropic;
        assert_eq!(ProviderClient::select(&settings), ProviderClient::Anthropic);
    }

    #[test]
    fn user_content_carries_preamble() {
        let text = NonEmptyString::new("This is").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);
        assert_eq!(
            request.user_content(),
            "Please rephrase the following text: This is"
        );
    }

    #[test]
    fn explain_context_is_appended() {
        let text = NonEmptyString::new("borrowck").unwrap();
        let request = CompletionRequest::new(OperationKind::Explain, &text)
            .with_context(Some("rustc diagnostics"));
        let content = request.user_content();
        assert!(content.starts_with("Please explain the following: borrowck"));
        assert!(content.ends_with("Context: rustc diagnostics"));
    }

    #[test]
    fn context_is_ignored_for_other_kinds() {
        let text = NonEmptyString::new("long article").unwrap();
        let request =
            CompletionRequest::new(OperationKind::Summarize, &text).with_context(Some("noise"));
        assert!(!request.user_content().contains("Context:"));
    }

    #[test]
    fn resolve_rejects_missing_credential() {
        let settings = Settings::default();
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);
        let err = ResolvedCall::resolve(Provider::OpenAI, &settings, &request).unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "No API key configured for OpenAI");
    }

    #[test]
    fn resolve_uses_override_prompt() {
        let mut settings = settings_with_keys();
        settings.prompts.rephrase = Some("Rewrite like a pirate.".to_string());
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);
        let call = ResolvedCall::resolve(Provider::OpenAI, &settings, &request).unwrap();
        assert_eq!(call.instruction, "Rewrite like a pirate.");
    }

    #[test]
    fn resolve_falls_back_to_default_instruction() {
        let settings = settings_with_keys();
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Summarize, &text);
        let call = ResolvedCall::resolve(Provider::OpenAI, &settings, &request).unwrap();
        assert_eq!(
            call.instruction,
            OperationKind::Summarize.default_instruction()
        );
    }

    #[test]
    fn resolve_applies_api_base_override() {
        let mut settings = settings_with_keys();
        settings.openai.api_base = Some("http://127.0.0.1:9999/".to_string());
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);
        let call = ResolvedCall::resolve(Provider::OpenAI, &settings, &request).unwrap();
        assert_eq!(call.endpoint, "http://127.0.0.1:9999/v1/chat/completions");
    }

    #[tokio::test]
    async fn missing_credential_never_reaches_the_network() {
        // No server is listening on this address; a network attempt would
        // surface as a transport error instead of the configuration message.
        let mut settings = Settings::default();
        settings.openai.api_base = Some("http://127.0.0.1:1".to_string());
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);

        let outcome = ProviderClient::OpenAI.complete(&request, &settings).await;
        assert_eq!(
            outcome.error(),
            Some("No API key configured for OpenAI")
        );
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let mut settings = settings_with_keys();
        settings.openai.api_base = Some("http://127.0.0.1:1".to_string());
        let text = NonEmptyString::new("hello").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);

        let outcome = ProviderClient::OpenAI.complete(&request, &settings).await;
        let error = outcome.error().unwrap();
        assert!(error.starts_with("Network error: "), "got: {error}");
    }
}
