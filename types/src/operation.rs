//! Operation domain model: what the user asked for and what came back.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::TabId;
use crate::proofs::NonEmptyString;

/// The three things Quill can do with a piece of text.
///
/// The kind determines the default instruction sent to the provider, the
/// page-side response deadline, and which modal actions are offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Rephrase,
    Summarize,
    Explain,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OperationKind::Rephrase => "rephrase",
            OperationKind::Summarize => "summarize",
            OperationKind::Explain => "explain",
        }
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            OperationKind::Rephrase => "Rephrase",
            OperationKind::Summarize => "Summarize",
            OperationKind::Explain => "Explain",
        }
    }

    /// Instruction used when the user has not configured an override prompt.
    #[must_use]
    pub const fn default_instruction(self) -> &'static str {
        match self {
            OperationKind::Rephrase => {
                "You are a writing assistant. Rephrase the text you are given to improve \
                 clarity and flow while preserving its meaning and tone. Reply with the \
                 rephrased text only."
            }
            OperationKind::Summarize => {
                "You are a writing assistant. Produce a concise summary of the text you \
                 are given. Reply with the summary only."
            }
            OperationKind::Explain => {
                "You are a helpful assistant. Explain the text you are given in plain \
                 language, defining any jargon it contains."
            }
        }
    }

    /// Fixed preamble prepended to the user text in the provider request.
    #[must_use]
    pub const fn request_preamble(self) -> &'static str {
        match self {
            OperationKind::Rephrase => "Please rephrase the following text: ",
            OperationKind::Summarize => "Please summarize the following text: ",
            OperationKind::Explain => "Please explain the following: ",
        }
    }

    /// How long the page waits for a response before synthesizing an error.
    /// Summaries and explanations read longer inputs, so they get more time.
    #[must_use]
    pub const fn response_timeout(self) -> Duration {
        match self {
            OperationKind::Rephrase => Duration::from_secs(30),
            OperationKind::Summarize | OperationKind::Explain => Duration::from_secs(60),
        }
    }

    /// Whether the result can be applied back into the document.
    #[must_use]
    pub const fn supports_accept(self) -> bool {
        matches!(self, OperationKind::Rephrase)
    }

    /// Whether the result modal offers a copy-to-clipboard action.
    #[must_use]
    pub const fn supports_copy(self) -> bool {
        matches!(self, OperationKind::Summarize | OperationKind::Explain)
    }

    #[must_use]
    pub const fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Rephrase,
            OperationKind::Summarize,
            OperationKind::Explain,
        ]
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized request: created at trigger time, consumed exactly once by
/// the coordinator, never persisted.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    kind: OperationKind,
    input: NonEmptyString,
    context: Option<String>,
    tab: TabId,
}

impl OperationRequest {
    #[must_use]
    pub fn rephrase(input: NonEmptyString, tab: TabId) -> Self {
        Self {
            kind: OperationKind::Rephrase,
            input,
            context: None,
            tab,
        }
    }

    #[must_use]
    pub fn summarize(input: NonEmptyString, tab: TabId) -> Self {
        Self {
            kind: OperationKind::Summarize,
            input,
            context: None,
            tab,
        }
    }

    /// Explain is the only kind that carries secondary context (text
    /// surrounding the selection, when the page supplies it).
    #[must_use]
    pub fn explain(input: NonEmptyString, context: Option<String>, tab: TabId) -> Self {
        Self {
            kind: OperationKind::Explain,
            input,
            context,
            tab,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn input(&self) -> &NonEmptyString {
        &self.input
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    #[must_use]
    pub const fn tab(&self) -> TabId {
        self.tab
    }
}

/// What a provider call produced. Immutable once created; forwarded verbatim
/// to the page that asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OperationOutcome {
    Success { text: String },
    Failure { message: String },
}

impl OperationOutcome {
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        OperationOutcome::Success { text: text.into() }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        OperationOutcome::Failure {
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success { .. })
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            OperationOutcome::Success { text } => Some(text),
            OperationOutcome::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            OperationOutcome::Success { .. } => None,
            OperationOutcome::Failure { message } => Some(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{OperationKind, OperationOutcome, OperationRequest};
    use crate::ids::TabId;
    use crate::proofs::NonEmptyString;
    use std::time::Duration;

    #[test]
    fn rephrase_is_the_only_acceptable_kind() {
        assert!(OperationKind::Rephrase.supports_accept());
        assert!(!OperationKind::Summarize.supports_accept());
        assert!(!OperationKind::Explain.supports_accept());
    }

    #[test]
    fn copy_is_offered_where_accept_is_not() {
        for kind in OperationKind::all() {
            assert_ne!(kind.supports_accept(), kind.supports_copy());
        }
    }

    #[test]
    fn timeouts_by_kind() {
        assert_eq!(
            OperationKind::Rephrase.response_timeout(),
            Duration::from_secs(30)
        );
        assert_eq!(
            OperationKind::Summarize.response_timeout(),
            Duration::from_secs(60)
        );
        assert_eq!(
            OperationKind::Explain.response_timeout(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn explain_carries_context() {
        let input = NonEmptyString::new("the borrow checker").unwrap();
        let request =
            OperationRequest::explain(input, Some("surrounding prose".into()), TabId::new(1));
        assert_eq!(request.context(), Some("surrounding prose"));
        assert_eq!(request.kind(), OperationKind::Explain);
    }

    #[test]
    fn outcome_accessors() {
        let ok = OperationOutcome::success("done");
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some("done"));
        assert_eq!(ok.error(), None);

        let bad = OperationOutcome::failure("Network error: boom");
        assert!(!bad.is_success());
        assert_eq!(bad.error(), Some("Network error: boom"));
    }

    #[test]
    fn outcome_serde_round_trip() {
        let outcome = OperationOutcome::failure("OpenAI API Error: 401 Unauthorized");
        let json = serde_json::to_string(&outcome).unwrap();
        let back: OperationOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(outcome, back);
    }
}
