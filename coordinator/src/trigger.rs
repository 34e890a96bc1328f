//! Trigger surfaces feeding the coordinator.
//!
//! Three independent sources produce triggers: the global context menu, the
//! global keyboard shortcuts, and page agents sending request/response
//! messages. Each variant carries everything needed to answer back, so the
//! coordinator never has to look up an implicit reply path.

use tokio::sync::oneshot;

use quill_types::{AgentResponse, TabId};

use crate::channel::PageHandle;

#[derive(Debug)]
pub enum Trigger {
    /// A page agent connected; its inbox handle is registered under `tab`.
    TabOpened { tab: TabId, handle: PageHandle },
    /// The page went away; pending pushes for it will be dropped.
    TabClosed { tab: TabId },
    /// Context menu activated on a text selection. The menu captures the
    /// selected text itself, so no round-trip to the page is needed.
    MenuSelection { tab: TabId, text: String },
    /// Context menu activated on the page background (no selection).
    MenuPage { tab: TabId },
    /// Keyboard shortcut: rephrase the current selection, if any.
    ShortcutRephrase { tab: TabId },
    /// Keyboard shortcut: summarize the selection, falling back to the page.
    ShortcutSummarize { tab: TabId },
    /// Raw request/response message from a page surface. The payload is
    /// decoded inside the coordinator so an unrecognized kind still gets a
    /// typed answer on `responder`.
    Agent {
        tab: TabId,
        payload: serde_json::Value,
        responder: oneshot::Sender<AgentResponse>,
    },
}
