use guardian_core::config::ConversationConfig;

use crate::types::ConversationContext;

/// Caps the number of user turns a conversation may accumulate.
///
/// Checked before the incoming user turn is appended: once the count reaches
/// `limit` the history has to be cleared first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverflowPolicy {
    limit: u32,
}

impl OverflowPolicy {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(config.message_limit)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_overflowing(&self, context: &ConversationContext) -> bool {
        context.user_turn_count() >= self.limit
    }
}
