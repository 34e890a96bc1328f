//! The floating action menu anchored to a live selection.
//!
//! The menu exists only while a non-empty selection persists and no modal is
//! mounted. Placement prefers the space above the selection; when that would
//! leave the viewport it flips below, and it is always clamped horizontally
//! to the viewport.

use quill_types::OperationKind;

use crate::geometry::{Point, Rect};

pub const MENU_WIDTH: i32 = 220;
pub const MENU_HEIGHT: i32 = 36;
/// Gap between the selection box and the menu.
pub const MENU_GAP: i32 = 6;

/// An action offered by the floating menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Rephrase,
    Summarize,
    Explain,
}

impl MenuAction {
    #[must_use]
    pub const fn kind(self) -> OperationKind {
        match self {
            MenuAction::Rephrase => OperationKind::Rephrase,
            MenuAction::Summarize => OperationKind::Summarize,
            MenuAction::Explain => OperationKind::Explain,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rephrase" => Some(MenuAction::Rephrase),
            "summarize" => Some(MenuAction::Summarize),
            "explain" => Some(MenuAction::Explain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatingMenu {
    rect: Rect,
}

impl FloatingMenu {
    /// Anchor near `selection`: centered above it, flipped below when the
    /// preferred position would overflow the viewport top, clamped to the
    /// viewport horizontally.
    #[must_use]
    pub fn anchored(selection: Rect, viewport: Rect) -> Self {
        let above = selection.y - MENU_GAP - MENU_HEIGHT;
        let y = if above < viewport.y {
            selection.bottom() + MENU_GAP
        } else {
            above
        };

        let centered = selection.x + selection.width / 2 - MENU_WIDTH / 2;
        let max_x = viewport.right() - MENU_WIDTH;
        let x = centered.clamp(viewport.x, max_x.max(viewport.x));

        Self {
            rect: Rect::new(x, y, MENU_WIDTH, MENU_HEIGHT),
        }
    }

    #[must_use]
    pub const fn rect(&self) -> Rect {
        self.rect
    }

    #[must_use]
    pub const fn contains(&self, point: Point) -> bool {
        self.rect.contains(point)
    }
}
