//! Generation backend adapters, the per-conversation turn service and the
//! channel-agnostic inbound message pipeline.

pub mod conversation;
pub mod ollama;
pub mod pipeline;
pub mod provider;

pub use conversation::{ConversationError, ConversationService, Reply};
pub use ollama::OllamaBackend;
pub use provider::{GenerateRequest, GenerateResponse, GenerationBackend, ProviderError};
