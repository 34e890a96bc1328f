//! Page agent for Quill.
//!
//! Everything that lives inside a page: live selection tracking with a
//! settle delay, the floating action menu anchored to the selection, the
//! single modal slot with its per-operation state machine, markdown
//! rendering for result bodies, and the two-tier clipboard. The
//! [`PageAgent`] routes host input events and coordinator messages into
//! those pieces.
//!
//! The agent is deliberately free of any concrete document API: hosts
//! implement [`DocumentHost`], and text replacement goes through an opaque
//! span handle.

mod agent;
mod clipboard;
mod format;
mod geometry;
mod host;
mod menu;
mod modal;
mod selection;

pub use agent::{EXPLAIN_CONTEXT_LIMIT, OperationReply, PageAgent, PageEvent};
pub use clipboard::{Clipboard, ClipboardAccess, ClipboardError, CopyPath, Osc52Clipboard, SystemClipboard};
pub use format::{CmarkFormatter, Formatter, escaped_paragraphs, plain_text, render_or_fallback};
pub use geometry::{Point, Rect};
pub use host::{DocumentHost, HostSelection, MemoryDocument, MemorySpan, ReplaceError};
pub use menu::{FloatingMenu, MENU_GAP, MENU_HEIGHT, MENU_WIDTH, MenuAction};
pub use modal::{
    ModalPhase, ModalSlot, MountedModal, RetryDispatch, UpdateDisposition, modal_body_rect,
};
pub use selection::{
    SELECTION_SETTLE, SELECTION_SUPPRESS, Selection, SelectionTracker, SelectionUpdate,
};
