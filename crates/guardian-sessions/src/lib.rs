//! Per-conversation dialogue context: storage, overflow policy, prompt rendering.

pub mod error;
pub mod overflow;
pub mod prompt;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use overflow::OverflowPolicy;
pub use prompt::render;
pub use store::{ConversationGuard, ConversationStore};
pub use types::{ConversationContext, ConversationStats, Role, Turn};
