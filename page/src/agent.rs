//! The page agent: one per page, routing host input events and coordinator
//! messages into the selection tracker, floating menu, and modal slot.
//!
//! The agent is a single-writer state machine. All of its state is mutated
//! from one call stack at a time; the only async edges are the coordinator
//! exchanges, whose replies are funneled back through an internal channel so
//! the driver can deliver them like any other event.

use std::time::Instant;

use tokio::sync::mpsc;

use quill_coordinator::{CoordinatorHandle, PageEnvelope};
use quill_types::{
    AgentRequest, ModalPush, OpToken, OperationKind, OperationOutcome, PageQuery, PageQueryReply,
    TabId, TokenCounter,
};

use crate::clipboard::Clipboard;
use crate::format::{self, Formatter};
use crate::geometry::Point;
use crate::host::DocumentHost;
use crate::menu::{FloatingMenu, MenuAction};
use crate::modal::{ModalSlot, MountedModal, UpdateDisposition, modal_body_rect};
use crate::selection::{Selection, SelectionTracker, SelectionUpdate};

/// Upper bound on the page context attached to an explain request.
pub const EXPLAIN_CONTEXT_LIMIT: usize = 2000;

/// Host-side input events delivered to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    PointerUp,
    /// Shift/arrow key released; the selection may have changed via keyboard.
    SelectionKeyUp,
    PointerDown {
        at: Point,
    },
    Escape,
    Menu(MenuAction),
    Retry,
    Accept,
    CopyResult,
    CloseModal,
}

/// A coordinator reply routed back to the driver loop.
#[derive(Debug)]
pub struct OperationReply {
    pub kind: OperationKind,
    pub token: OpToken,
    pub outcome: OperationOutcome,
}

pub struct PageAgent<H: DocumentHost> {
    tab: TabId,
    host: H,
    coordinator: CoordinatorHandle,
    reply_tx: mpsc::UnboundedSender<OperationReply>,
    tracker: SelectionTracker,
    menu: Option<FloatingMenu>,
    slot: ModalSlot,
    held: Option<Selection<H::Span>>,
    tokens: TokenCounter,
    clipboard: Clipboard,
    formatter: Box<dyn Formatter + Send>,
}

impl<H: DocumentHost> PageAgent<H> {
    /// Build an agent and the receiver its coordinator replies arrive on.
    pub fn new(
        tab: TabId,
        host: H,
        coordinator: CoordinatorHandle,
        clipboard: Clipboard,
        formatter: Box<dyn Formatter + Send>,
    ) -> (Self, mpsc::UnboundedReceiver<OperationReply>) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            Self {
                tab,
                host,
                coordinator,
                reply_tx,
                tracker: SelectionTracker::new(),
                menu: None,
                slot: ModalSlot::new(),
                held: None,
                tokens: TokenCounter::page(),
                clipboard,
                formatter,
            },
            reply_rx,
        )
    }

    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn menu(&self) -> Option<&FloatingMenu> {
        self.menu.as_ref()
    }

    #[must_use]
    pub fn modal(&self) -> Option<&MountedModal> {
        self.slot.mounted()
    }

    /// HTML body for a result modal, via the formatter with the escaped
    /// fallback. `None` unless a result is showing.
    #[must_use]
    pub fn result_html(&self) -> Option<String> {
        let output = self.slot.mounted()?.output()?;
        Some(format::render_or_fallback(self.formatter.as_ref(), output))
    }

    /// When the driver should call [`poll`](Self::poll) next.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.tracker.next_deadline(), self.slot.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advance time-based state: pending selection reads and the modal
    /// response deadline.
    pub fn poll(&mut self, now: Instant) {
        if self.slot.poll_deadline(now) {
            tracing::debug!("Modal deadline expired");
        }

        let viewport = self.host.viewport();
        if let Some(update) = self.tracker.poll(now, &self.host) {
            match update {
                SelectionUpdate::Settled(selection) => {
                    // The menu only exists while no modal is mounted.
                    if self.slot.mounted().is_none() {
                        self.menu = Some(FloatingMenu::anchored(selection.rect, viewport));
                    }
                }
                SelectionUpdate::Cleared => self.menu = None,
            }
        }
    }

    pub fn handle_event(&mut self, event: PageEvent, now: Instant) {
        match event {
            PageEvent::PointerUp | PageEvent::SelectionKeyUp => self.tracker.note_input(now),
            PageEvent::PointerDown { at } => self.pointer_down(at),
            PageEvent::Escape => {
                if self.slot.mounted().is_some() {
                    self.close_modal();
                } else {
                    self.menu = None;
                }
            }
            PageEvent::Menu(action) => self.menu_action(action, now),
            PageEvent::Retry => self.retry(now),
            PageEvent::Accept => self.accept(),
            PageEvent::CopyResult => self.copy_result(),
            PageEvent::CloseModal => self.close_modal(),
        }
    }

    pub fn handle_envelope(&mut self, envelope: PageEnvelope, now: Instant) {
        match envelope {
            PageEnvelope::Query { query, reply } => {
                let text = match query {
                    PageQuery::GetSelection => self.host.selection().map(|s| s.text),
                    PageQuery::GetPageContent => {
                        Some(self.host.page_content()).filter(|c| !c.trim().is_empty())
                    }
                };
                if reply.send(PageQueryReply { text }).is_err() {
                    tracing::debug!("Coordinator stopped waiting for a query reply");
                }
            }
            PageEnvelope::Push(push) => self.handle_push(push, now),
        }
    }

    /// Deliver a coordinator reply to the modal. Returns what the slot did
    /// with it, mostly for tests and logging.
    pub fn handle_reply(&mut self, reply: OperationReply, _now: Instant) -> UpdateDisposition {
        let disposition = self.slot.apply_update(reply.token, reply.outcome);
        if disposition != UpdateDisposition::Applied {
            tracing::debug!(
                token = %reply.token,
                ?disposition,
                "Discarded a reply for an operation that is no longer showing"
            );
        }
        disposition
    }

    fn handle_push(&mut self, push: ModalPush, now: Instant) {
        match push {
            ModalPush::Show {
                operation,
                original_text,
                token,
            } => {
                self.menu = None;
                if self
                    .slot
                    .open(operation, original_text, None, token, now)
                    .is_some()
                {
                    self.held = None;
                }
                // A coordinator-triggered rephrase works on whatever is
                // selected right now; capture it so Accept can replace it.
                if operation.supports_accept() {
                    self.held = self.host.selection().and_then(Selection::capture);
                }
            }
            ModalPush::Update { token, outcome, .. } => {
                let disposition = self.slot.apply_update(token, outcome);
                if disposition != UpdateDisposition::Applied {
                    tracing::debug!(%token, ?disposition, "Discarded modal update push");
                }
            }
            ModalPush::Hide => {
                self.slot.close();
                self.held = None;
            }
            ModalPush::ReplaceText { new_text } => match self.held.take() {
                Some(selection) => {
                    if let Err(err) = self.host.replace(&selection.span, &new_text) {
                        tracing::warn!("Could not replace the selected text: {err}");
                    }
                }
                None => tracing::warn!("Replace push with no held selection"),
            },
        }
    }

    fn pointer_down(&mut self, at: Point) {
        if self.slot.mounted().is_some() {
            // Clicks inside the modal body stay in the modal; the backdrop
            // closes it.
            if !modal_body_rect(self.host.viewport()).contains(at) {
                self.close_modal();
            }
            return;
        }
        if let Some(menu) = &self.menu
            && !menu.contains(at)
        {
            self.menu = None;
        }
    }

    fn menu_action(&mut self, action: MenuAction, now: Instant) {
        if self.menu.is_none() {
            tracing::debug!("Menu action without a visible menu");
            return;
        }
        let captured = self.host.selection().and_then(Selection::capture);
        let Some(captured) = captured else {
            self.menu = None;
            return;
        };

        // Clearing the selection fires change events of its own; the
        // suppression window keeps them from re-anchoring the menu.
        self.host.clear_selection();
        self.tracker.note_programmatic_clear(now);
        self.menu = None;

        let kind = action.kind();
        let context = (kind == OperationKind::Explain)
            .then(|| truncate_chars(&self.host.page_content(), EXPLAIN_CONTEXT_LIMIT));
        let input = captured.text.to_string();
        let token = self.tokens.next();

        self.slot
            .open(kind, input.clone(), context.clone(), token, now);
        self.held = kind.supports_accept().then_some(captured);
        self.dispatch(kind, input, context, token);
    }

    fn retry(&mut self, now: Instant) {
        let token = self.tokens.next();
        if let Some(dispatch) = self.slot.retry(token, now) {
            self.dispatch(
                dispatch.kind,
                dispatch.input,
                dispatch.context,
                dispatch.token,
            );
        }
    }

    fn accept(&mut self) {
        let Some(output) = self.slot.accept() else {
            return;
        };
        match self.held.take() {
            Some(selection) => {
                if let Err(err) = self.host.replace(&selection.span, &output) {
                    tracing::warn!("Could not apply the rephrased text: {err}");
                }
            }
            None => tracing::warn!("Accept with no held selection to replace"),
        }
    }

    fn copy_result(&mut self) {
        let plain = match self.slot.mounted() {
            Some(modal) if modal.can_copy() => modal.output().map(format::plain_text),
            _ => None,
        };
        let Some(plain) = plain else {
            return;
        };
        match self.clipboard.copy(&plain) {
            Ok(path) => tracing::debug!(?path, "Copied result to clipboard"),
            Err(err) => tracing::warn!("Copy failed on both paths: {err}"),
        }
    }

    fn close_modal(&mut self) {
        if self.slot.close().is_some() {
            self.held = None;
        }
    }

    /// Send an operation to the coordinator; the reply is forwarded onto the
    /// agent's reply channel tagged with `token`, and the modal's deadline
    /// covers the case where no reply ever comes.
    fn dispatch(
        &mut self,
        kind: OperationKind,
        input: String,
        context: Option<String>,
        token: OpToken,
    ) {
        let request = match kind {
            OperationKind::Rephrase => AgentRequest::Rephrase { text: input },
            OperationKind::Summarize => AgentRequest::Summarize { text: input },
            OperationKind::Explain => AgentRequest::AskAi {
                text: input,
                context,
            },
        };

        let reply_rx = self.coordinator.request(self.tab, &request);
        let reply_tx = self.reply_tx.clone();
        tokio::spawn(async move {
            match reply_rx.await {
                Ok(response) => {
                    let _ = reply_tx.send(OperationReply {
                        kind,
                        token,
                        outcome: response.into_outcome(),
                    });
                }
                // The coordinator went away; the modal deadline will fail
                // the operation on our side.
                Err(_) => tracing::debug!("No reply for {kind}; coordinator dropped the channel"),
            }
        });
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}
