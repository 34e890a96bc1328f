//! Core domain types for Quill.
//!
//! This crate contains pure domain types with no IO and no async: provider
//! and model identity, operation requests and outcomes, the wire protocol
//! exchanged between the background coordinator and page agents, and the
//! resolved settings model. Everything here can be used from any layer.

mod ids;
mod operation;
mod proofs;
mod protocol;
mod provider;
mod settings;

pub use ids::{OpToken, TabId, TokenCounter};
pub use operation::{OperationKind, OperationOutcome, OperationRequest};
pub use proofs::{EmptyStringError, NonEmptyString};
pub use protocol::{
    AgentRequest, AgentResponse, ModalPush, PageQuery, PageQueryReply, UnknownRequestError,
};
pub use provider::{ApiKey, MissingKeyError, ModelName, ModelParseError, Provider, ProviderParseError};
pub use settings::{PromptOverrides, ProviderSettings, Settings, ValidationReport};
