use thiserror::Error;

/// Errors that can occur while mutating a conversation context.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// An assistant turn was appended to a context with no user turn.
    #[error("assistant turn without a preceding user turn in conversation {conversation_id}")]
    OrphanAssistantTurn { conversation_id: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
