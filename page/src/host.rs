//! Abstraction over the document the page agent lives in.
//!
//! The agent never touches a concrete document API. It sees an opaque span
//! handle capable of delete-and-insert, a way to read the current selection,
//! and a way to read extractable page content. [`MemoryDocument`] is the
//! reference implementation used by tests and the terminal demo host.

use std::ops::Range;

use thiserror::Error;

use crate::geometry::Rect;

#[derive(Debug, Error)]
pub enum ReplaceError {
    #[error("the selected span is no longer part of the document")]
    SpanInvalidated,
}

/// A live selection as the host sees it: the text, an opaque span handle
/// that can later replace it, and its bounding box for menu anchoring.
#[derive(Debug, Clone)]
pub struct HostSelection<S> {
    pub text: String,
    pub span: S,
    pub rect: Rect,
}

/// Capabilities the page agent needs from its host document.
pub trait DocumentHost {
    /// Opaque handle to a text span, valid until the document changes under it.
    type Span: Clone + std::fmt::Debug;

    /// The current live selection, if any. Whitespace-only selections may be
    /// reported; callers treat them as no selection.
    fn selection(&self) -> Option<HostSelection<Self::Span>>;

    /// Extractable main content of the page. Empty when there is none.
    fn page_content(&self) -> String;

    fn viewport(&self) -> Rect;

    /// Delete the span and insert `text` in its place, collapsing the cursor
    /// after the inserted text.
    fn replace(&mut self, span: &Self::Span, text: &str) -> Result<(), ReplaceError>;

    /// Drop the live selection highlight.
    fn clear_selection(&mut self);
}

/// Span handle into a [`MemoryDocument`]. The revision stamp invalidates the
/// handle when the document is edited after the span was captured.
#[derive(Debug, Clone)]
pub struct MemorySpan {
    range: Range<usize>,
    revision: u64,
}

/// In-memory document host for tests and the terminal demo.
#[derive(Debug)]
pub struct MemoryDocument {
    content: String,
    selection: Option<Range<usize>>,
    viewport: Rect,
    revision: u64,
}

/// Synthetic layout used to give selections a bounding box: a fixed-width
/// line of `COLS` characters, `LINE_HEIGHT` pixels tall.
const COLS: usize = 80;
const CHAR_WIDTH: i32 = 8;
const LINE_HEIGHT: i32 = 16;

impl MemoryDocument {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            selection: None,
            viewport: Rect::new(0, 0, 1280, 800),
            revision: 0,
        }
    }

    #[must_use]
    pub fn with_viewport(mut self, viewport: Rect) -> Self {
        self.viewport = viewport;
        self
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Select the first occurrence of `needle`. Returns whether it was found.
    pub fn select_str(&mut self, needle: &str) -> bool {
        match self.content.find(needle) {
            Some(start) => {
                self.selection = Some(start..start + needle.len());
                true
            }
            None => false,
        }
    }

    pub fn select_range(&mut self, range: Range<usize>) {
        self.selection = Some(range);
    }

    fn selection_rect(&self, range: &Range<usize>) -> Rect {
        let chars_before = self.content[..range.start].chars().count();
        let len = self.content[range.clone()].chars().count().max(1);
        let row = (chars_before / COLS) as i32;
        let col = (chars_before % COLS) as i32;
        Rect::new(
            self.viewport.x + col * CHAR_WIDTH,
            self.viewport.y + row * LINE_HEIGHT,
            (len.min(COLS) as i32) * CHAR_WIDTH,
            LINE_HEIGHT,
        )
    }
}

impl DocumentHost for MemoryDocument {
    type Span = MemorySpan;

    fn selection(&self) -> Option<HostSelection<MemorySpan>> {
        let range = self.selection.clone()?;
        let text = self.content.get(range.clone())?.to_string();
        Some(HostSelection {
            text,
            rect: self.selection_rect(&range),
            span: MemorySpan {
                range,
                revision: self.revision,
            },
        })
    }

    fn page_content(&self) -> String {
        self.content.clone()
    }

    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn replace(&mut self, span: &MemorySpan, text: &str) -> Result<(), ReplaceError> {
        if span.revision != self.revision
            || span.range.end > self.content.len()
            || !self.content.is_char_boundary(span.range.start)
            || !self.content.is_char_boundary(span.range.end)
        {
            return Err(ReplaceError::SpanInvalidated);
        }
        self.content.replace_range(span.range.clone(), text);
        self.revision += 1;
        // Cursor collapses after the insert; no selection survives an edit.
        self.selection = None;
        Ok(())
    }

    fn clear_selection(&mut self) {
        self.selection = None;
    }
}
