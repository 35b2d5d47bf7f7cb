use thiserror::Error;

use crate::domain::conversation::ConversationStatus;
use crate::domain::instance::InstanceStatus;
use crate::domain::run::RunStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid conversation transition from {from:?} to {to:?}")]
    InvalidConversationTransition { from: ConversationStatus, to: ConversationStatus },
    #[error("invalid instance transition from {from:?} to {to:?}")]
    InvalidInstanceTransition { from: InstanceStatus, to: InstanceStatus },
    #[error("invalid run transition from {from:?} to {to:?}")]
    InvalidRunTransition { from: RunStatus, to: RunStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
