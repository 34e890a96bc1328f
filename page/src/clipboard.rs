//! Two-tier clipboard: the system clipboard device first, an OSC 52 escape
//! write second. The fallback exists because clipboard devices genuinely
//! fail (headless sessions, denied access), and a Copy button that silently
//! does nothing is worse than a second-choice path.

use std::io::Write;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("clipboard unavailable: {0}")]
pub struct ClipboardError(pub String);

pub trait ClipboardAccess {
    fn write(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// The OS clipboard via arboard. The device handle is opened per write;
/// holding it for the process lifetime pins clipboard ownership on some
/// platforms.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl ClipboardAccess for SystemClipboard {
    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError(e.to_string()))?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| ClipboardError(e.to_string()))
    }
}

/// OSC 52 escape-sequence clipboard: asks the hosting terminal to set the
/// clipboard on our behalf. Works over SSH where no clipboard device exists.
#[derive(Debug)]
pub struct Osc52Clipboard<W: Write> {
    out: W,
}

impl<W: Write> Osc52Clipboard<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> ClipboardAccess for Osc52Clipboard<W> {
    fn write(&mut self, text: &str) -> Result<(), ClipboardError> {
        let encoded = BASE64.encode(text.as_bytes());
        write!(self.out, "\x1b]52;c;{encoded}\x07")
            .and_then(|()| self.out.flush())
            .map_err(|e| ClipboardError(e.to_string()))
    }
}

/// Which path a copy took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPath {
    Primary,
    Fallback,
}

/// Primary-then-fallback clipboard used by the page agent.
pub struct Clipboard {
    primary: Box<dyn ClipboardAccess + Send>,
    fallback: Box<dyn ClipboardAccess + Send>,
}

impl std::fmt::Debug for Clipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clipboard").finish_non_exhaustive()
    }
}

impl Clipboard {
    pub fn new(
        primary: Box<dyn ClipboardAccess + Send>,
        fallback: Box<dyn ClipboardAccess + Send>,
    ) -> Self {
        Self { primary, fallback }
    }

    /// System device first, OSC 52 to stdout as the fallback.
    #[must_use]
    pub fn system() -> Self {
        Self::new(
            Box::new(SystemClipboard),
            Box::new(Osc52Clipboard::new(std::io::stdout())),
        )
    }

    pub fn copy(&mut self, text: &str) -> Result<CopyPath, ClipboardError> {
        match self.primary.write(text) {
            Ok(()) => Ok(CopyPath::Primary),
            Err(primary_err) => {
                tracing::debug!("Primary clipboard failed ({primary_err}); trying fallback");
                self.fallback.write(text).map(|()| CopyPath::Fallback)
            }
        }
    }
}
