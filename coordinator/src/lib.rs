//! Background coordinator for Quill.
//!
//! The [`Coordinator`] is the single long-lived entry point of the system:
//! it owns the trigger queue, the registry of connected pages, and the
//! settings store handle, and it turns each trigger into exactly one
//! provider call with exactly one terminal answer.
//!
//! # Lifecycle invariant
//!
//! Every trigger produces one terminal outcome for its originating surface:
//!
//! - request/response triggers get exactly one reply on their responder;
//! - push-style triggers (menu, shortcut) get a `Show` (loading) push sent
//!   synchronously before the provider call starts, followed by exactly one
//!   `Update` push with the outcome.
//!
//! Provider failures, settings failures, and unknown request kinds are all
//! converted to failure values before they reach a channel; nothing at this
//! layer propagates an error past the messaging boundary, because a surface
//! waiting on an exchange has no other way to learn that it ended.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use quill_config::SettingsStore;
use quill_providers::{CompletionRequest, ProviderClient};
use quill_types::{
    AgentRequest, AgentResponse, ModalPush, NonEmptyString, OperationKind, OperationOutcome,
    OperationRequest, PageQuery, Settings, TabId, TokenCounter,
};

mod channel;
mod trigger;

pub use channel::{PAGE_QUERY_TIMEOUT, PageEnvelope, PageHandle};
pub use trigger::Trigger;

/// Client side of the coordinator: cheap to clone, safe to hand to every
/// trigger surface.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Trigger>,
}

impl CoordinatorHandle {
    fn send(&self, trigger: Trigger) {
        if self.tx.send(trigger).is_err() {
            tracing::warn!("Coordinator is gone; trigger dropped");
        }
    }

    /// Connect a page and receive its inbox.
    #[must_use]
    pub fn register_tab(&self, tab: TabId) -> mpsc::UnboundedReceiver<PageEnvelope> {
        let (handle, rx) = PageHandle::channel();
        self.send(Trigger::TabOpened { tab, handle });
        rx
    }

    pub fn close_tab(&self, tab: TabId) {
        self.send(Trigger::TabClosed { tab });
    }

    pub fn menu_selection(&self, tab: TabId, text: impl Into<String>) {
        self.send(Trigger::MenuSelection {
            tab,
            text: text.into(),
        });
    }

    pub fn menu_page(&self, tab: TabId) {
        self.send(Trigger::MenuPage { tab });
    }

    pub fn shortcut_rephrase(&self, tab: TabId) {
        self.send(Trigger::ShortcutRephrase { tab });
    }

    pub fn shortcut_summarize(&self, tab: TabId) {
        self.send(Trigger::ShortcutSummarize { tab });
    }

    /// Send a typed request; the reply arrives on the returned receiver.
    #[must_use]
    pub fn request(&self, tab: TabId, request: &AgentRequest) -> oneshot::Receiver<AgentResponse> {
        let payload = serde_json::to_value(request).unwrap_or_default();
        self.request_raw(tab, payload)
    }

    /// Send a raw envelope, as a foreign surface would. Undecodable payloads
    /// are answered with [`AgentResponse::UnknownRequest`].
    #[must_use]
    pub fn request_raw(
        &self,
        tab: TabId,
        payload: serde_json::Value,
    ) -> oneshot::Receiver<AgentResponse> {
        let (responder, rx) = oneshot::channel();
        self.send(Trigger::Agent {
            tab,
            payload,
            responder,
        });
        rx
    }
}

/// The process-wide coordinator. Constructed once at startup; owns its
/// resources explicitly instead of living in module-level state.
#[derive(Debug)]
pub struct Coordinator {
    store: SettingsStore,
    tabs: HashMap<TabId, PageHandle>,
    triggers: mpsc::UnboundedReceiver<Trigger>,
    tokens: TokenCounter,
}

impl Coordinator {
    #[must_use]
    pub fn new(store: SettingsStore) -> (Self, CoordinatorHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                store,
                tabs: HashMap::new(),
                triggers: rx,
                tokens: TokenCounter::coordinator(),
            },
            CoordinatorHandle { tx },
        )
    }

    /// Run until every [`CoordinatorHandle`] is dropped.
    pub async fn run(mut self) {
        while let Some(trigger) = self.triggers.recv().await {
            self.handle_trigger(trigger).await;
        }
        tracing::info!("Trigger queue closed; coordinator shutting down");
    }

    async fn handle_trigger(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::TabOpened { tab, handle } => {
                tracing::debug!(%tab, "Page connected");
                self.tabs.insert(tab, handle);
            }
            Trigger::TabClosed { tab } => {
                tracing::debug!(%tab, "Page disconnected");
                self.tabs.remove(&tab);
            }
            Trigger::MenuSelection { tab, text } => {
                match NonEmptyString::from_trimmed(&text) {
                    Some(input) => self.start_operation(OperationRequest::rephrase(input, tab)),
                    // The menu item only appears over a selection; an empty
                    // capture means it evaporated before the click landed.
                    None => tracing::debug!(%tab, "Menu selection trigger without text"),
                }
            }
            Trigger::MenuPage { tab } => {
                let content = self.query_tab(tab, PageQuery::GetPageContent).await;
                match content.as_deref().and_then(NonEmptyString::from_trimmed) {
                    Some(input) => self.start_operation(OperationRequest::summarize(input, tab)),
                    None => self.push_failed_modal(
                        tab,
                        OperationKind::Summarize,
                        "Could not read any content from this page",
                    ),
                }
            }
            Trigger::ShortcutRephrase { tab } => {
                match self
                    .query_tab(tab, PageQuery::GetSelection)
                    .await
                    .as_deref()
                    .and_then(NonEmptyString::from_trimmed)
                {
                    Some(input) => self.start_operation(OperationRequest::rephrase(input, tab)),
                    // Nothing selected: the shortcut is a no-op by design.
                    None => tracing::debug!(%tab, "Rephrase shortcut with no selection"),
                }
            }
            Trigger::ShortcutSummarize { tab } => {
                let selection = self.query_tab(tab, PageQuery::GetSelection).await;
                let text = match selection {
                    Some(text) => Some(text),
                    None => self.query_tab(tab, PageQuery::GetPageContent).await,
                };
                match text.as_deref().and_then(NonEmptyString::from_trimmed) {
                    Some(input) => self.start_operation(OperationRequest::summarize(input, tab)),
                    None => self.push_failed_modal(
                        tab,
                        OperationKind::Summarize,
                        "Nothing to summarize on this page",
                    ),
                }
            }
            Trigger::Agent {
                tab,
                payload,
                responder,
            } => self.handle_agent_request(tab, &payload, responder),
        }
    }

    async fn query_tab(&self, tab: TabId, query: PageQuery) -> Option<String> {
        let Some(handle) = self.tabs.get(&tab) else {
            tracing::warn!(%tab, "Query for an unregistered tab");
            return None;
        };
        handle.query(query).await
    }

    /// Start a push-flow operation: loading push now, outcome push when the
    /// provider resolves. The loading push leaves before the provider future
    /// is spawned, so a page always observes loading before the terminal
    /// update of the same token.
    fn start_operation(&mut self, request: OperationRequest) {
        let Some(handle) = self.tabs.get(&request.tab()).cloned() else {
            tracing::warn!(tab = %request.tab(), "Operation for an unregistered tab");
            return;
        };
        let token = self.tokens.next();
        let kind = request.kind();

        handle.push(ModalPush::Show {
            operation: kind,
            original_text: request.input().to_string(),
            token,
        });

        let settings = self.store.load();
        tokio::spawn(async move {
            let outcome = execute_operation(&settings, &request).await;
            handle.push(ModalPush::Update {
                operation: kind,
                token,
                outcome,
            });
        });
    }

    /// Mount a modal and immediately fail it. Used when a trigger cannot even
    /// produce an input, but silence would leave the user guessing.
    fn push_failed_modal(&mut self, tab: TabId, kind: OperationKind, message: &str) {
        let Some(handle) = self.tabs.get(&tab).cloned() else {
            return;
        };
        let token = self.tokens.next();
        handle.push(ModalPush::Show {
            operation: kind,
            original_text: String::new(),
            token,
        });
        handle.push(ModalPush::Update {
            operation: kind,
            token,
            outcome: OperationOutcome::failure(message),
        });
    }

    fn handle_agent_request(
        &mut self,
        tab: TabId,
        payload: &serde_json::Value,
        responder: oneshot::Sender<AgentResponse>,
    ) {
        let request = match AgentRequest::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%tab, "Unrecognized agent request: {err}");
                respond(responder, AgentResponse::UnknownRequest { kind: err.kind });
                return;
            }
        };

        match request {
            AgentRequest::GetSettings => {
                respond(
                    responder,
                    AgentResponse::Settings {
                        settings: self.store.load(),
                    },
                );
            }
            AgentRequest::SaveSettings { settings } => {
                let report = settings.validate();
                if !report.is_valid() {
                    respond(responder, AgentResponse::saved(&report));
                    return;
                }
                let response = match self.store.save(&settings) {
                    Ok(()) => AgentResponse::Saved {
                        success: true,
                        errors: Vec::new(),
                    },
                    Err(err) => AgentResponse::Saved {
                        success: false,
                        errors: vec![err.to_string()],
                    },
                };
                respond(responder, response);
            }
            AgentRequest::Rephrase { text } => {
                self.run_agent_operation(tab, OperationKind::Rephrase, text, None, responder);
            }
            AgentRequest::Summarize { text } => {
                self.run_agent_operation(tab, OperationKind::Summarize, text, None, responder);
            }
            AgentRequest::AskAi { text, context } => {
                self.run_agent_operation(tab, OperationKind::Explain, text, context, responder);
            }
        }
    }

    /// Request/response flavor of an operation. The provider call runs on its
    /// own task so a slow backend never blocks the trigger queue.
    fn run_agent_operation(
        &mut self,
        tab: TabId,
        kind: OperationKind,
        text: String,
        context: Option<String>,
        responder: oneshot::Sender<AgentResponse>,
    ) {
        let Some(input) = NonEmptyString::from_trimmed(&text) else {
            respond(
                responder,
                AgentResponse::from_outcome(kind, &OperationOutcome::failure("No text provided")),
            );
            return;
        };

        let request = match kind {
            OperationKind::Rephrase => OperationRequest::rephrase(input, tab),
            OperationKind::Summarize => OperationRequest::summarize(input, tab),
            OperationKind::Explain => OperationRequest::explain(input, context, tab),
        };

        let settings = self.store.load();
        tokio::spawn(async move {
            let outcome = execute_operation(&settings, &request).await;
            respond(responder, AgentResponse::from_outcome(kind, &outcome));
        });
    }
}

/// One provider call with every failure folded into the outcome.
async fn execute_operation(settings: &Settings, request: &OperationRequest) -> OperationOutcome {
    let client = ProviderClient::select(settings);
    let completion =
        CompletionRequest::new(request.kind(), request.input()).with_context(request.context());
    client.complete(&completion, settings).await
}

fn respond(responder: oneshot::Sender<AgentResponse>, response: AgentResponse) {
    if responder.send(response).is_err() {
        tracing::debug!("Requester went away before its response was ready");
    }
}
