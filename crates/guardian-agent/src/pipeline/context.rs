//! Seams between the inbound pipeline and its host.
//!
//! `MessageContext` is implemented by the gateway's `AppState`; `ChatTransport`
//! by each messaging adapter. Both live here so the agent crate never depends
//! on a concrete transport.

use async_trait::async_trait;

use guardian_core::config::GuardianConfig;
use guardian_core::types::{ConversationId, InboundMessage, MediaPayload};
use guardian_moderation::ModerationPipeline;

use crate::conversation::ConversationService;

/// Shared services the inbound pipeline needs from its host.
pub trait MessageContext: Send + Sync {
    /// `None` when moderation is disabled in config.
    fn moderation(&self) -> Option<&ModerationPipeline>;
    fn conversations(&self) -> &ConversationService;
    fn config(&self) -> &GuardianConfig;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{channel} transport failed: {reason}")]
    Failed { channel: String, reason: String },

    #[error("media too large: {size} bytes (max {max})")]
    MediaTooLarge { size: u64, max: u64 },
}

/// Outbound side of a messaging transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send_text(&self, to: &ConversationId, text: &str) -> Result<(), TransportError>;

    /// Send `text` quoting `msg`.
    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), TransportError>;

    async fn send_sticker(
        &self,
        to: &ConversationId,
        media: &MediaPayload,
    ) -> Result<(), TransportError>;

    /// Delete `msg`, for every participant when `for_everyone` is set.
    async fn delete_message(
        &self,
        msg: &InboundMessage,
        for_everyone: bool,
    ) -> Result<(), TransportError>;

    async fn start_typing(&self, to: &ConversationId);

    async fn stop_typing(&self, to: &ConversationId);

    /// Fetch the media attached to `msg`. `Ok(None)` when it has none or it
    /// is no longer retrievable.
    async fn download_media(
        &self,
        msg: &InboundMessage,
    ) -> Result<Option<MediaPayload>, TransportError>;
}
