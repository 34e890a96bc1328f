//! Wire protocol between the background coordinator and page agents.
//!
//! Every message is a closed enum with a `kind` tag, so dispatch is an
//! exhaustive match and adding a message kind is a compile-time-checked
//! change. Unknown kinds exist only at the decode boundary
//! ([`AgentRequest::decode`]) and are answered with a typed response rather
//! than dropped.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::OpToken;
use crate::operation::{OperationKind, OperationOutcome};
use crate::settings::{Settings, ValidationReport};

/// Coordinator-to-page request expecting a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PageQuery {
    #[serde(rename = "GET_SELECTION")]
    GetSelection,
    #[serde(rename = "GET_PAGE_CONTENT")]
    GetPageContent,
}

/// Reply to a [`PageQuery`]. `None` means the page had nothing usable
/// (no selection, or no extractable content).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageQueryReply {
    pub text: Option<String>,
}

impl PageQueryReply {
    #[must_use]
    pub fn some(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Coordinator-to-page push driving the modal lifecycle. No reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModalPush {
    /// Mount a modal for `operation` in its loading state.
    #[serde(rename = "SHOW_MODAL")]
    Show {
        operation: OperationKind,
        original_text: String,
        token: OpToken,
    },
    /// Deliver the terminal outcome for the operation identified by `token`.
    #[serde(rename = "UPDATE_MODAL")]
    Update {
        operation: OperationKind,
        token: OpToken,
        outcome: OperationOutcome,
    },
    #[serde(rename = "HIDE_MODAL")]
    Hide,
    /// Replace the held selection span with `new_text`.
    #[serde(rename = "REPLACE_TEXT")]
    ReplaceText { new_text: String },
}

/// Page-to-coordinator request; the reply travels back on the same exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AgentRequest {
    #[serde(rename = "REPHRASE_TEXT")]
    Rephrase { text: String },
    #[serde(rename = "SUMMARIZE_TEXT")]
    Summarize { text: String },
    #[serde(rename = "ASK_AI")]
    AskAi {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    #[serde(rename = "GET_SETTINGS")]
    GetSettings,
    #[serde(rename = "SAVE_SETTINGS")]
    SaveSettings { settings: Settings },
}

/// A message whose `kind` tag no coordinator handler recognizes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized request kind '{kind}'")]
pub struct UnknownRequestError {
    pub kind: String,
}

impl AgentRequest {
    /// Decode a raw envelope.
    ///
    /// This is the one place an unknown message kind can appear; everything
    /// past this boundary matches on closed enums.
    pub fn decode(value: &serde_json::Value) -> Result<Self, UnknownRequestError> {
        serde_json::from_value(value.clone()).map_err(|_| {
            let kind = value
                .get("kind")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("<missing>")
                .to_string();
            UnknownRequestError { kind }
        })
    }

    /// The operation this request maps to, if it is an operation at all.
    #[must_use]
    pub const fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            AgentRequest::Rephrase { .. } => Some(OperationKind::Rephrase),
            AgentRequest::Summarize { .. } => Some(OperationKind::Summarize),
            AgentRequest::AskAi { .. } => Some(OperationKind::Explain),
            AgentRequest::GetSettings | AgentRequest::SaveSettings { .. } => None,
        }
    }
}

/// Coordinator reply to an [`AgentRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AgentResponse {
    #[serde(rename = "OPERATION_RESULT")]
    Operation {
        operation: OperationKind,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "SETTINGS")]
    Settings { settings: Settings },
    #[serde(rename = "SETTINGS_SAVED")]
    Saved { success: bool, errors: Vec<String> },
    #[serde(rename = "UNKNOWN_REQUEST")]
    UnknownRequest {
        #[serde(rename = "requestKind")]
        kind: String,
    },
}

impl AgentResponse {
    #[must_use]
    pub fn from_outcome(operation: OperationKind, outcome: &OperationOutcome) -> Self {
        match outcome {
            OperationOutcome::Success { text } => AgentResponse::Operation {
                operation,
                success: true,
                text: Some(text.clone()),
                error: None,
            },
            OperationOutcome::Failure { message } => AgentResponse::Operation {
                operation,
                success: false,
                text: None,
                error: Some(message.clone()),
            },
        }
    }

    #[must_use]
    pub fn saved(report: &ValidationReport) -> Self {
        AgentResponse::Saved {
            success: report.is_valid(),
            errors: report.errors().to_vec(),
        }
    }

    /// Convert an operation reply back into the outcome it carried.
    /// Non-operation replies (settings, unknown) map to a failure so the
    /// modal still reaches a terminal state.
    #[must_use]
    pub fn into_outcome(self) -> OperationOutcome {
        match self {
            AgentResponse::Operation {
                success: true,
                text: Some(text),
                ..
            } => OperationOutcome::Success { text },
            AgentResponse::Operation {
                error: Some(message),
                ..
            } => OperationOutcome::Failure { message },
            AgentResponse::Operation { operation, .. } => OperationOutcome::Failure {
                message: format!("Empty {operation} response"),
            },
            AgentResponse::UnknownRequest { kind } => OperationOutcome::Failure {
                message: format!("unrecognized request kind '{kind}'"),
            },
            AgentResponse::Settings { .. } | AgentResponse::Saved { .. } => {
                OperationOutcome::Failure {
                    message: "Unexpected settings reply to an operation request".to_string(),
                }
            }
        }
    }
}
