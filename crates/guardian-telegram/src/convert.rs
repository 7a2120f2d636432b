//! Conversion of teloxide messages into transport-neutral `InboundMessage`s.

use teloxide::types::{MediaKind as TgMediaKind, Message, MessageCommon, MessageKind, UserId};

use guardian_core::types::{InboundMessage, MediaKind};

/// Downloadable file behind a message's media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub file_id: String,
    pub mime_type: String,
}

/// Map a Telegram message. `bot_id` identifies messages sent by the bot.
///
/// The conversation id is the chat id, so a group shares one context. Bots
/// cannot see view-once state, so media sent behind a spoiler is treated as
/// view-once.
pub fn to_inbound(msg: &Message, bot_id: UserId) -> InboundMessage {
    let media_kind = media_kind(msg);
    let sender_id = match (&msg.from, &msg.sender_chat) {
        (Some(user), _) => user.id.0.to_string(),
        (None, Some(chat)) => chat.id.0.to_string(),
        (None, None) => msg.chat.id.0.to_string(),
    };

    InboundMessage {
        message_id: msg.id.0.to_string(),
        sender_id,
        conversation_id: msg.chat.id.0.to_string().into(),
        body: msg.text().or(msg.caption()).unwrap_or("").to_string(),
        has_media: media_kind.is_some(),
        media_kind,
        view_once: has_spoiler(msg),
        from_me: msg.from.as_ref().is_some_and(|u| u.id == bot_id),
    }
}

fn media_kind(msg: &Message) -> Option<MediaKind> {
    if msg.photo().is_some() {
        Some(MediaKind::Image)
    } else if msg.sticker().is_some() {
        Some(MediaKind::Sticker)
    } else if msg.video().is_some() || msg.animation().is_some() || msg.video_note().is_some() {
        Some(MediaKind::Video)
    } else if msg.audio().is_some() || msg.voice().is_some() {
        Some(MediaKind::Audio)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else {
        None
    }
}

fn has_spoiler(msg: &Message) -> bool {
    match &msg.kind {
        MessageKind::Common(MessageCommon { media_kind, .. }) => match media_kind {
            TgMediaKind::Photo(photo) => photo.has_media_spoiler,
            TgMediaKind::Video(video) => video.has_media_spoiler,
            TgMediaKind::Animation(animation) => animation.has_media_spoiler,
            _ => false,
        },
        _ => false,
    }
}

/// File to download for the message's media, if any.
///
/// Photos resolve to their largest size.
pub fn media_ref(msg: &Message) -> Option<MediaRef> {
    fn mime_or<M: AsRef<str>>(mime: Option<&M>, fallback: &str) -> String {
        mime.map(|m| m.as_ref())
            .unwrap_or(fallback)
            .to_string()
    }

    let (file_id, mime_type) = if let Some(photo) = msg.photo().and_then(|p| p.last()) {
        (&photo.file.id, "image/jpeg".to_string())
    } else if let Some(sticker) = msg.sticker() {
        (&sticker.file.id, "image/webp".to_string())
    } else if let Some(doc) = msg.document() {
        (&doc.file.id, mime_or(doc.mime_type.as_ref(), "application/octet-stream"))
    } else if let Some(video) = msg.video() {
        (&video.file.id, mime_or(video.mime_type.as_ref(), "video/mp4"))
    } else if let Some(animation) = msg.animation() {
        (&animation.file.id, mime_or(animation.mime_type.as_ref(), "video/mp4"))
    } else if let Some(note) = msg.video_note() {
        (&note.file.id, "video/mp4".to_string())
    } else if let Some(audio) = msg.audio() {
        (&audio.file.id, mime_or(audio.mime_type.as_ref(), "audio/mpeg"))
    } else if let Some(voice) = msg.voice() {
        (&voice.file.id, mime_or(voice.mime_type.as_ref(), "audio/ogg"))
    } else {
        return None;
    };

    Some(MediaRef {
        file_id: file_id.to_string(),
        mime_type,
    })
}
