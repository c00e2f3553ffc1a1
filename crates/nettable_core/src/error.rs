//! crates/nettable_core/src/error.rs
//!
//! Errors a conversation step can produce. All of them degrade to a text
//! prompt for the user; none of them drops a draft on its own.

use crate::conversation::FsmState;
use crate::domain::Field;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversationError {
    /// The answer does not satisfy the field's format. The session does not move.
    #[error("Invalid input. {reason}")]
    Validation { field: Option<Field>, reason: String },

    /// The event makes no sense in the current state.
    #[error("'{event}' is not expected while {state}")]
    UnknownSessionEvent { state: FsmState, event: &'static str },

    /// The table store rejected the commit. The draft is kept for a retry.
    #[error("The table could not be saved right now: {reason}")]
    StorageFailure { reason: String },

    /// A wiring bug between the dispatcher and the state machine.
    #[error("Internal error: {reason}")]
    InvariantViolation { reason: String },
}

impl ConversationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ConversationError::Validation { .. } => "validation_error",
            ConversationError::UnknownSessionEvent { .. } => "unknown_session_event",
            ConversationError::StorageFailure { .. } => "storage_failure",
            ConversationError::InvariantViolation { .. } => "invariant_violation",
        }
    }

    /// Text shown to the chat user.
    pub fn user_message(&self) -> String {
        match self {
            ConversationError::StorageFailure { .. } => {
                "The table is temporarily unavailable. Your answers are kept, please try confirming again."
                    .to_string()
            }
            ConversationError::InvariantViolation { .. } => {
                "Something went wrong on our side and the current fill was reset.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ConversationError::StorageFailure { .. })
    }
}
