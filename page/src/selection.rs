//! Live selection tracking.
//!
//! Selection changes arrive as pointer-up and key-up notifications. The
//! native selection is not stable at the instant those fire, so reads are
//! deferred by a short settle delay. A separate suppression window covers
//! the moment a menu action clears the selection: the clearing itself fires
//! change notifications, and without the window the menu would re-anchor
//! off its own removal.

use std::time::{Duration, Instant};

use quill_types::NonEmptyString;

use crate::host::{DocumentHost, HostSelection};

/// Delay between an input notification and the selection read.
pub const SELECTION_SETTLE: Duration = Duration::from_millis(10);

/// Re-entrancy window after a programmatic selection clear.
pub const SELECTION_SUPPRESS: Duration = Duration::from_millis(50);

/// A captured selection held for later replacement: the text at capture time
/// plus the opaque span that can apply new text in its place.
#[derive(Debug, Clone)]
pub struct Selection<S> {
    pub text: NonEmptyString,
    pub span: S,
}

impl<S> Selection<S> {
    /// Capture from a host selection; whitespace-only text captures nothing.
    #[must_use]
    pub fn capture(host_selection: HostSelection<S>) -> Option<Self> {
        let text = NonEmptyString::from_trimmed(&host_selection.text)?;
        Some(Self {
            text,
            span: host_selection.span,
        })
    }
}

/// What a poll observed, reported only on change.
#[derive(Debug)]
pub enum SelectionUpdate<S> {
    /// A non-empty selection settled.
    Settled(HostSelection<S>),
    /// The selection went away (or trimmed to nothing).
    Cleared,
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    pending_read: Option<Instant>,
    suppress_until: Option<Instant>,
    current: Option<String>,
}

impl SelectionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A pointer-up or selection-key-up was observed; schedule a read.
    pub fn note_input(&mut self, now: Instant) {
        self.pending_read = Some(now + SELECTION_SETTLE);
    }

    /// A menu action is about to clear the selection programmatically;
    /// swallow the change notifications that clearing will fire.
    pub fn note_programmatic_clear(&mut self, now: Instant) {
        self.suppress_until = Some(now + SELECTION_SUPPRESS);
        self.pending_read = None;
        self.current = None;
    }

    /// When the driver should call [`poll`](Self::poll) next.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_read
    }

    /// Perform any due read against the host. Returns an update only when
    /// the observed selection differs from the last reported one.
    pub fn poll<H: DocumentHost>(
        &mut self,
        now: Instant,
        host: &H,
    ) -> Option<SelectionUpdate<H::Span>> {
        let due = self.pending_read.is_some_and(|at| at <= now);
        if !due {
            return None;
        }
        self.pending_read = None;

        if self.suppress_until.is_some_and(|until| now < until) {
            tracing::trace!("Selection read suppressed inside the clear window");
            return None;
        }
        self.suppress_until = None;

        let observed = host
            .selection()
            .filter(|sel| !sel.text.trim().is_empty());

        match observed {
            Some(selection) => {
                let changed = self.current.as_deref() != Some(selection.text.as_str());
                self.current = Some(selection.text.clone());
                changed.then_some(SelectionUpdate::Settled(selection))
            }
            None => {
                let had = self.current.take().is_some();
                had.then_some(SelectionUpdate::Cleared)
            }
        }
    }
}
