use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use guardian_core::types::ConversationId;

use crate::error::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Human-readable label used when the history is rendered into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One message from either side of the dialogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded dialogue history of one conversation.
///
/// Fields are private so `user_turn_count <= history.len()` always holds and
/// an assistant turn can never precede the first user turn.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    conversation_id: ConversationId,
    history: Vec<Turn>,
    user_turn_count: u32,
    updated_at: Option<DateTime<Utc>>,
}

impl ConversationContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            history: Vec::new(),
            user_turn_count: 0,
            updated_at: None,
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn user_turn_count(&self) -> u32 {
        self.user_turn_count
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.history.push(Turn::user(content));
        self.user_turn_count += 1;
        self.updated_at = Some(Utc::now());
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) -> Result<()> {
        if self.user_turn_count == 0 {
            return Err(SessionError::OrphanAssistantTurn {
                conversation_id: self.conversation_id.to_string(),
            });
        }
        self.history.push(Turn::assistant(content));
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Drop the whole history and zero the counters, keeping the identifier.
    pub fn clear(&mut self) {
        self.history.clear();
        self.user_turn_count = 0;
        self.updated_at = Some(Utc::now());
    }
}

/// Snapshot reported by `!stats` and the HTTP stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    /// User turns since the last reset.
    pub user_turns: u32,
    /// User turns left before the history is cleared.
    pub turns_remaining: u32,
    /// Turns from both sides currently in the history.
    pub total_turns: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ConversationStats {
    /// Stats for a conversation that has never been seen.
    pub fn empty(limit: u32) -> Self {
        Self {
            user_turns: 0,
            turns_remaining: limit,
            total_turns: 0,
            updated_at: None,
        }
    }

    pub fn of(context: &ConversationContext, limit: u32) -> Self {
        Self {
            user_turns: context.user_turn_count(),
            turns_remaining: limit.saturating_sub(context.user_turn_count()),
            total_turns: context.history().len(),
            updated_at: context.updated_at(),
        }
    }
}
