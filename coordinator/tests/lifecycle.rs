//! End-to-end trigger lifecycle tests: every trigger surface gets exactly one
//! terminal answer, and push flows always show loading before the outcome.

use std::time::Duration;

use tokio::sync::mpsc;

use quill_config::SettingsStore;
use quill_coordinator::{Coordinator, CoordinatorHandle, PageEnvelope};
use quill_types::{
    AgentRequest, AgentResponse, ModalPush, OperationKind, PageQuery, PageQueryReply, Provider,
    Settings, TabId,
};

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TAB: TabId = TabId::new(1);

fn store_with(settings: &Settings) -> (SettingsStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SettingsStore::at(dir.path().join("config.toml"));
    store.save(settings).unwrap();
    (store, dir)
}

fn openai_settings(server: &MockServer) -> Settings {
    let mut settings = Settings::default();
    settings.openai.api_key = "sk-test".to_string();
    settings.openai.api_base = Some(server.uri());
    settings
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [ { "message": { "role": "assistant", "content": content } } ]
    })
}

/// Spawn a coordinator over `settings` and return its handle plus the keep-alive
/// guard for the temp config dir.
fn spawn_coordinator(settings: &Settings) -> (CoordinatorHandle, TempDir) {
    let (store, dir) = store_with(settings);
    let (coordinator, handle) = Coordinator::new(store);
    tokio::spawn(coordinator.run());
    (handle, dir)
}

/// Serve a page's inbox: answer queries with fixed texts, forward pushes.
fn serve_page(
    mut inbox: mpsc::UnboundedReceiver<PageEnvelope>,
    selection: Option<&str>,
    content: Option<&str>,
) -> mpsc::UnboundedReceiver<ModalPush> {
    let selection = selection.map(str::to_string);
    let content = content.map(str::to_string);
    let (push_tx, push_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(envelope) = inbox.recv().await {
            match envelope {
                PageEnvelope::Query { query, reply } => {
                    let text = match query {
                        PageQuery::GetSelection => selection.clone(),
                        PageQuery::GetPageContent => content.clone(),
                    };
                    let _ = reply.send(PageQueryReply { text });
                }
                PageEnvelope::Push(push) => {
                    let _ = push_tx.send(push);
                }
            }
        }
    });

    push_rx
}

async fn next_push(pushes: &mut mpsc::UnboundedReceiver<ModalPush>) -> ModalPush {
    tokio::time::timeout(Duration::from_secs(5), pushes.recv())
        .await
        .expect("push should arrive")
        .expect("push channel open")
}

async fn assert_no_push(pushes: &mut mpsc::UnboundedReceiver<ModalPush>) {
    let result = tokio::time::timeout(Duration::from_millis(200), pushes.recv()).await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

#[tokio::test]
async fn menu_selection_shows_loading_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {},
                { "role": "user", "content": "Please rephrase the following text: This is" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("That was")))
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, None);

    handle.menu_selection(TAB, "This is");

    let show = next_push(&mut pushes).await;
    let ModalPush::Show {
        operation,
        original_text,
        token: shown_token,
    } = show
    else {
        panic!("expected Show first, got {show:?}");
    };
    assert_eq!(operation, OperationKind::Rephrase);
    assert_eq!(original_text, "This is");

    let update = next_push(&mut pushes).await;
    let ModalPush::Update {
        operation,
        token,
        outcome,
    } = update
    else {
        panic!("expected Update second, got {update:?}");
    };
    assert_eq!(operation, OperationKind::Rephrase);
    assert_eq!(token, shown_token);
    assert_eq!(outcome.text(), Some("That was"));
}

#[tokio::test]
async fn protocol_error_reaches_the_page_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, None);

    handle.menu_selection(TAB, "This is");

    assert!(matches!(next_push(&mut pushes).await, ModalPush::Show { .. }));
    let ModalPush::Update { outcome, .. } = next_push(&mut pushes).await else {
        panic!("expected Update");
    };
    assert_eq!(outcome.error(), Some("OpenAI API Error: 401 Unauthorized"));
}

#[tokio::test]
async fn missing_credential_fails_before_any_network_call() {
    if std::env::var(Provider::Anthropic.env_var()).is_ok() {
        // The environment supplies a key, so the fail-fast path cannot be
        // reproduced here.
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("never")))
        .expect(0)
        .mount(&server)
        .await;

    let mut settings = Settings::default();
    settings.active_provider = Provider::Anthropic;
    settings.anthropic.api_base = Some(server.uri());

    let (handle, _dir) = spawn_coordinator(&settings);
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, None);

    handle.menu_selection(TAB, "some words");

    assert!(matches!(next_push(&mut pushes).await, ModalPush::Show { .. }));
    let ModalPush::Update { outcome, .. } = next_push(&mut pushes).await else {
        panic!("expected Update");
    };
    assert_eq!(outcome.error(), Some("No API key configured for Anthropic"));
}

#[tokio::test]
async fn rephrase_shortcut_without_selection_is_silent() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, Some("page body"));

    handle.shortcut_rephrase(TAB);

    assert_no_push(&mut pushes).await;
}

#[tokio::test]
async fn summarize_shortcut_prefers_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                {},
                { "role": "user", "content": "Please summarize the following text: chosen words" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("gist")))
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, Some("chosen words"), Some("whole page"));

    handle.shortcut_summarize(TAB);

    assert!(matches!(next_push(&mut pushes).await, ModalPush::Show { .. }));
    let ModalPush::Update { outcome, .. } = next_push(&mut pushes).await else {
        panic!("expected Update");
    };
    assert_eq!(outcome.text(), Some("gist"));
}

#[tokio::test]
async fn summarize_shortcut_falls_back_to_page_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                {},
                { "role": "user", "content": "Please summarize the following text: whole page" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("gist")))
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, Some("whole page"));

    handle.shortcut_summarize(TAB);

    assert!(matches!(next_push(&mut pushes).await, ModalPush::Show { .. }));
    assert!(matches!(
        next_push(&mut pushes).await,
        ModalPush::Update { outcome, .. } if outcome.is_success()
    ));
}

#[tokio::test]
async fn summarize_shortcut_with_nothing_pushes_an_error_state() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, None);

    handle.shortcut_summarize(TAB);

    let show = next_push(&mut pushes).await;
    let ModalPush::Show { token: shown, .. } = show else {
        panic!("expected Show first, got {show:?}");
    };
    let ModalPush::Update { token, outcome, .. } = next_push(&mut pushes).await else {
        panic!("expected Update");
    };
    assert_eq!(token, shown);
    assert_eq!(outcome.error(), Some("Nothing to summarize on this page"));
}

#[tokio::test]
async fn closed_tab_receives_nothing() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let inbox = handle.register_tab(TAB);
    let mut pushes = serve_page(inbox, None, None);

    handle.close_tab(TAB);
    handle.menu_selection(TAB, "orphaned words");

    assert_no_push(&mut pushes).await;
}

#[tokio::test]
async fn unknown_request_kind_gets_a_typed_answer() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let _inbox = handle.register_tab(TAB);

    let reply = handle
        .request_raw(TAB, json!({ "kind": "OPEN_SIDEBAR", "payload": 1 }))
        .await
        .unwrap();

    assert_eq!(
        reply,
        AgentResponse::UnknownRequest {
            kind: "OPEN_SIDEBAR".to_string()
        }
    );
}

#[tokio::test]
async fn whitespace_input_never_reaches_the_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("never")))
        .expect(0)
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let _inbox = handle.register_tab(TAB);

    for request in [
        AgentRequest::Rephrase { text: "   ".into() },
        AgentRequest::Summarize { text: "\n\t".into() },
        AgentRequest::AskAi {
            text: String::new(),
            context: None,
        },
    ] {
        let reply = handle.request(TAB, &request).await.unwrap();
        let AgentResponse::Operation { success, error, .. } = reply else {
            panic!("expected an operation reply");
        };
        assert!(!success);
        assert_eq!(error.as_deref(), Some("No text provided"));
    }
}

#[tokio::test]
async fn ask_ai_passes_context_through() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [
                {},
                {
                    "role": "user",
                    "content": "Please explain the following: RAII\n\nContext: a systems article"
                }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("scope-owned")))
        .expect(1)
        .mount(&server)
        .await;

    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let _inbox = handle.register_tab(TAB);

    let reply = handle
        .request(
            TAB,
            &AgentRequest::AskAi {
                text: "RAII".to_string(),
                context: Some("a systems article".to_string()),
            },
        )
        .await
        .unwrap();

    let AgentResponse::Operation { success, text, .. } = reply else {
        panic!("expected an operation reply");
    };
    assert!(success);
    assert_eq!(text.as_deref(), Some("scope-owned"));
}

#[tokio::test]
async fn settings_round_trip_over_the_request_channel() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let _inbox = handle.register_tab(TAB);

    let mut updated = openai_settings(&server);
    updated.active_provider = Provider::Anthropic;
    updated.anthropic.api_key = "sk-ant-new".to_string();
    updated.prompts.summarize = Some("Two sentences max.".to_string());

    let reply = handle
        .request(
            TAB,
            &AgentRequest::SaveSettings {
                settings: updated.clone(),
            },
        )
        .await
        .unwrap();
    assert_eq!(
        reply,
        AgentResponse::Saved {
            success: true,
            errors: Vec::new()
        }
    );

    let reply = handle.request(TAB, &AgentRequest::GetSettings).await.unwrap();
    let AgentResponse::Settings { settings } = reply else {
        panic!("expected settings");
    };
    assert_eq!(settings, updated);
}

#[tokio::test]
async fn invalid_settings_are_refused_with_messages() {
    let server = MockServer::start().await;
    let (handle, _dir) = spawn_coordinator(&openai_settings(&server));
    let _inbox = handle.register_tab(TAB);

    let mut bad = Settings::default();
    bad.active_provider = Provider::Anthropic;
    bad.anthropic.api_key = String::new();
    bad.anthropic.model = String::new();

    let reply = handle
        .request(TAB, &AgentRequest::SaveSettings { settings: bad })
        .await
        .unwrap();

    let AgentResponse::Saved { success, errors } = reply else {
        panic!("expected saved reply");
    };
    assert!(!success);
    assert!(
        errors
            .iter()
            .any(|e| e == "Anthropic API key is not configured")
    );
    assert!(errors.iter().any(|e| e == "Anthropic model is not set"));
}
