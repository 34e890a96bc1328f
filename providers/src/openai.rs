//! OpenAI Chat Completions API implementation.
//!
//! Sends one non-streaming request to `/v1/chat/completions` with the
//! instruction as the system message and the preamble-wrapped text as the
//! user message. The first choice's message content is the result.

use serde::Deserialize;
use serde_json::json;

use quill_types::Provider;

use crate::{ProviderError, ResolvedCall, ensure_success, http_client};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) async fn complete(call: &ResolvedCall) -> Result<String, ProviderError> {
    let provider = Provider::OpenAI;
    let body = json!({
        "model": call.model.as_str(),
        "messages": [
            { "role": "system", "content": call.instruction },
            { "role": "user", "content": call.user_content }
        ]
    });

    let response = http_client()
        .post(&call.endpoint)
        .bearer_auth(call.key.expose_secret())
        .json(&body)
        .send()
        .await
        .map_err(|source| ProviderError::Transport { source })?;

    let response = ensure_success(provider, response).await?;

    let payload: ChatCompletionResponse = response.json().await.map_err(|e| {
        tracing::debug!("Failed to parse OpenAI response body: {e}");
        ProviderError::EmptyResult { provider }
    })?;

    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ProviderError::EmptyResult { provider })
}
