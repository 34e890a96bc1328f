//! Anthropic Messages API implementation.
//!
//! Sends one non-streaming request to `/v1/messages` with the instruction as
//! the system prompt and the preamble-wrapped text as the single user turn.
//! The first text content block is the result.

use serde::Deserialize;
use serde_json::json;

use quill_types::Provider;

use crate::{ProviderError, ResolvedCall, ensure_success, http_client};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

pub(crate) async fn complete(call: &ResolvedCall) -> Result<String, ProviderError> {
    let provider = Provider::Anthropic;
    let body = json!({
        "model": call.model.as_str(),
        "max_tokens": MAX_OUTPUT_TOKENS,
        "system": call.instruction,
        "messages": [
            { "role": "user", "content": call.user_content }
        ]
    });

    let response = http_client()
        .post(&call.endpoint)
        .header("x-api-key", call.key.expose_secret())
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|source| ProviderError::Transport { source })?;

    let response = ensure_success(provider, response).await?;

    let payload: MessagesResponse = response.json().await.map_err(|e| {
        tracing::debug!("Failed to parse Anthropic response body: {e}");
        ProviderError::EmptyResult { provider }
    })?;

    payload
        .content
        .into_iter()
        .find(|block| block.block_type == "text")
        .and_then(|block| block.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ProviderError::EmptyResult { provider })
}

#[cfg(test)]
mod tests {
    use crate::{CompletionRequest, ProviderClient};
    use quill_types::{NonEmptyString, OperationKind, Provider, Settings};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_settings() -> (MockServer, Settings) {
        let server = MockServer::start().await;
        let mut settings = Settings::default();
        settings.active_provider = Provider::Anthropic;
        settings.anthropic.api_key = "sk-ant-test".to_string();
        settings.anthropic.api_base = Some(server.uri());
        (server, settings)
    }

    fn messages_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "content": [ { "type": "text", "text": text } ]
        })
    }

    #[tokio::test]
    async fn success_uses_messages_endpoint_and_headers() {
        let (server, settings) = server_settings().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({
                "model": Provider::Anthropic.default_model_id(),
                "messages": [
                    { "role": "user", "content": "Please summarize the following text: a long read" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(messages_body("a short read")))
            .expect(1)
            .mount(&server)
            .await;

        let text = NonEmptyString::new("a long read").unwrap();
        let request = CompletionRequest::new(OperationKind::Summarize, &text);
        let outcome = ProviderClient::Anthropic.complete(&request, &settings).await;

        assert_eq!(outcome.text(), Some("a short read"));
    }

    #[tokio::test]
    async fn overloaded_maps_to_protocol_error() {
        let (server, settings) = server_settings().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let text = NonEmptyString::new("busy").unwrap();
        let request = CompletionRequest::new(OperationKind::Explain, &text);
        let outcome = ProviderClient::Anthropic.complete(&request, &settings).await;

        assert_eq!(outcome.error(), Some("Anthropic API Error: 529 <unknown status code>"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_protocol_error() {
        let (server, settings) = server_settings().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let text = NonEmptyString::new("This is").unwrap();
        let request = CompletionRequest::new(OperationKind::Rephrase, &text);
        let outcome = ProviderClient::Anthropic.complete(&request, &settings).await;

        assert_eq!(
            outcome.error(),
            Some("Anthropic API Error: 401 Unauthorized")
        );
    }

    #[tokio::test]
    async fn non_text_blocks_are_skipped() {
        let (server, settings) = server_settings().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "thinking", "thinking": "hmm" },
                    { "type": "text", "text": "the answer" }
                ]
            })))
            .mount(&server)
            .await;

        let text = NonEmptyString::new("question").unwrap();
        let request = CompletionRequest::new(OperationKind::Explain, &text);
        let outcome = ProviderClient::Anthropic.complete(&request, &settings).await;

        assert_eq!(outcome.text(), Some("the answer"));
    }

    #[tokio::test]
    async fn missing_text_maps_to_empty_result() {
        let (server, settings) = server_settings().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "content": [] })))
            .mount(&server)
            .await;

        let text = NonEmptyString::new("anything").unwrap();
        let request = CompletionRequest::new(OperationKind::Summarize, &text);
        let outcome = ProviderClient::Anthropic.complete(&request, &settings).await;

        assert_eq!(outcome.error(), Some("No response from Anthropic API"));
    }
}
