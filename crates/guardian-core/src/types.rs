use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of one dialogue thread (a Telegram chat, a WhatsApp group, …).
///
/// Opaque to the core: only equality and hashing matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Coarse media type tag attached to an inbound message by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Sticker,
    Video,
    Audio,
    Document,
    Other,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Sticker => write!(f, "sticker"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Document => write!(f, "document"),
            MediaKind::Other => write!(f, "other"),
        }
    }
}

/// A message received from the messaging transport, already stripped of
/// platform-specific types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform-native message identifier, needed to delete or reply.
    pub message_id: String,

    /// Platform-native identifier of the author.
    pub sender_id: String,

    /// Dialogue thread the message belongs to.
    pub conversation_id: ConversationId,

    /// Plain text content (or media caption).
    pub body: String,

    pub has_media: bool,

    /// `None` when `has_media` is false.
    pub media_kind: Option<MediaKind>,

    /// Ephemeral ("view once") content. Always removed.
    pub view_once: bool,

    /// Sent by the bot account itself.
    pub from_me: bool,
}

impl InboundMessage {
    /// Text-only message, mostly useful for tests and synthetic events.
    pub fn text(
        conversation_id: impl Into<ConversationId>,
        sender_id: &str,
        message_id: &str,
        body: &str,
    ) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender_id: sender_id.to_string(),
            conversation_id: conversation_id.into(),
            body: body.to_string(),
            has_media: false,
            media_kind: None,
            view_once: false,
            from_me: false,
        }
    }

    /// Attach a media tag to the message.
    pub fn with_media(mut self, kind: MediaKind) -> Self {
        self.has_media = true;
        self.media_kind = Some(kind);
        self
    }

    pub fn is_image(&self) -> bool {
        self.has_media && self.media_kind == Some(MediaKind::Image)
    }
}

/// Downloaded media bytes, fetched on demand from the transport.
#[derive(Clone)]
pub struct MediaPayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl fmt::Debug for MediaPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}
