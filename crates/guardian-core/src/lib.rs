pub mod config;
pub mod error;
pub mod types;

pub use config::GuardianConfig;
pub use error::{GuardianError, Result};
pub use types::{ConversationId, InboundMessage, MediaKind, MediaPayload};
