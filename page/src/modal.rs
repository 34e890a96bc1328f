//! The modal lifecycle state machine.
//!
//! One slot holds at most one mounted modal for the whole page; opening any
//! kind force-closes whatever is mounted. A mounted modal moves through
//! `Loading -> Result | Failed`, with `Retry` re-arming `Loading` and
//! `Accept`/`Close` unmounting. Terminal phases are reachable only from
//! `Loading`, and only by a response carrying the token the modal was armed
//! with; anything else is discarded, which is what makes a late response
//! from an abandoned operation harmless.
//!
//! The message channel under the modal has no delivery guarantee, so every
//! `Loading` entry arms a deadline. Deadline expiry synthesizes a failure;
//! without it a stalled exchange would leave the spinner up forever.

use std::time::Instant;

use quill_types::{OpToken, OperationKind, OperationOutcome};

use crate::geometry::Rect;

const MODAL_MAX_WIDTH: i32 = 640;
const MODAL_MAX_HEIGHT: i32 = 420;
const MODAL_VIEWPORT_MARGIN: i32 = 40;

/// Where the modal body sits: centered in the viewport. Pointer-downs inside
/// this rect must not reach the backdrop handler.
#[must_use]
pub fn modal_body_rect(viewport: Rect) -> Rect {
    let width = (viewport.width - 2 * MODAL_VIEWPORT_MARGIN).min(MODAL_MAX_WIDTH);
    let height = (viewport.height - 2 * MODAL_VIEWPORT_MARGIN).min(MODAL_MAX_HEIGHT);
    Rect::new(
        viewport.x + (viewport.width - width) / 2,
        viewport.y + (viewport.height - height) / 2,
        width,
        height,
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalPhase {
    /// Spinner up, action buttons suppressed.
    Loading,
    Result { output: String },
    Failed { message: String },
}

/// What happened to a delivered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDisposition {
    Applied,
    /// No modal is mounted; the operation was abandoned.
    NoModal,
    /// The mounted modal waits on a different operation.
    StaleToken,
    /// A terminal phase is already shown; duplicate delivery.
    NotLoading,
}

/// Everything needed to reissue an operation on retry.
#[derive(Debug, Clone)]
pub struct RetryDispatch {
    pub kind: OperationKind,
    pub input: String,
    pub context: Option<String>,
    pub token: OpToken,
}

#[derive(Debug)]
pub struct MountedModal {
    kind: OperationKind,
    original: String,
    context: Option<String>,
    token: OpToken,
    phase: ModalPhase,
    deadline: Option<Instant>,
}

impl MountedModal {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    #[must_use]
    pub const fn token(&self) -> OpToken {
        self.token
    }

    #[must_use]
    pub const fn phase(&self) -> &ModalPhase {
        &self.phase
    }

    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self.phase, ModalPhase::Loading)
    }

    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match &self.phase {
            ModalPhase::Result { output } => Some(output),
            _ => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            ModalPhase::Failed { message } => Some(message),
            _ => None,
        }
    }

    /// Accept is offered only on a rephrase result.
    #[must_use]
    pub fn can_accept(&self) -> bool {
        self.kind.supports_accept() && matches!(self.phase, ModalPhase::Result { .. })
    }

    /// Copy is offered on summarize/explain results.
    #[must_use]
    pub fn can_copy(&self) -> bool {
        self.kind.supports_copy() && matches!(self.phase, ModalPhase::Result { .. })
    }

    /// Retry is offered from both terminal phases, never while loading.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        matches!(
            self.phase,
            ModalPhase::Result { .. } | ModalPhase::Failed { .. }
        )
    }
}

/// The page's single modal slot.
#[derive(Debug, Default)]
pub struct ModalSlot {
    mounted: Option<MountedModal>,
}

impl ModalSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a modal in `Loading`, force-closing any mounted one. Returns the
    /// kind of the modal that was displaced, if any.
    pub fn open(
        &mut self,
        kind: OperationKind,
        original: String,
        context: Option<String>,
        token: OpToken,
        now: Instant,
    ) -> Option<OperationKind> {
        let replaced = self.mounted.take().map(|modal| modal.kind);
        self.mounted = Some(MountedModal {
            kind,
            original,
            context,
            token,
            phase: ModalPhase::Loading,
            deadline: Some(now + kind.response_timeout()),
        });
        replaced
    }

    /// Deliver an outcome. Applied only to a loading modal armed with the
    /// same token; every other delivery is reported and dropped.
    pub fn apply_update(
        &mut self,
        token: OpToken,
        outcome: OperationOutcome,
    ) -> UpdateDisposition {
        let Some(modal) = self.mounted.as_mut() else {
            return UpdateDisposition::NoModal;
        };
        if modal.token != token {
            return UpdateDisposition::StaleToken;
        }
        if !modal.is_loading() {
            return UpdateDisposition::NotLoading;
        }

        modal.deadline = None;
        modal.phase = match outcome {
            OperationOutcome::Success { text } => ModalPhase::Result { output: text },
            OperationOutcome::Failure { message } => ModalPhase::Failed { message },
        };
        UpdateDisposition::Applied
    }

    /// Convert an expired deadline into a failed phase. Returns whether the
    /// modal changed.
    pub fn poll_deadline(&mut self, now: Instant) -> bool {
        let Some(modal) = self.mounted.as_mut() else {
            return false;
        };
        let expired = modal.deadline.is_some_and(|deadline| deadline <= now);
        if !(expired && modal.is_loading()) {
            return false;
        }

        modal.deadline = None;
        modal.phase = ModalPhase::Failed {
            message: format!(
                "Request timed out after {} seconds",
                modal.kind.response_timeout().as_secs()
            ),
        };
        true
    }

    /// Re-enter `Loading` from a terminal phase, armed with `token`. The
    /// returned dispatch carries the same original input (and context) as
    /// the first entry.
    pub fn retry(&mut self, token: OpToken, now: Instant) -> Option<RetryDispatch> {
        let modal = self.mounted.as_mut()?;
        if !modal.can_retry() {
            return None;
        }

        modal.token = token;
        modal.phase = ModalPhase::Loading;
        modal.deadline = Some(now + modal.kind.response_timeout());
        Some(RetryDispatch {
            kind: modal.kind,
            input: modal.original.clone(),
            context: modal.context.clone(),
            token,
        })
    }

    /// Take the accepted output and unmount. `None` unless the mounted modal
    /// is a rephrase result.
    pub fn accept(&mut self) -> Option<String> {
        if !self.mounted.as_ref().is_some_and(MountedModal::can_accept) {
            return None;
        }
        let modal = self.mounted.take()?;
        match modal.phase {
            ModalPhase::Result { output } => Some(output),
            _ => None,
        }
    }

    /// Unmount, returning the kind that was mounted.
    pub fn close(&mut self) -> Option<OperationKind> {
        self.mounted.take().map(|modal| modal.kind)
    }

    #[must_use]
    pub fn mounted(&self) -> Option<&MountedModal> {
        self.mounted.as_ref()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.mounted.as_ref().and_then(|modal| modal.deadline)
    }
}
