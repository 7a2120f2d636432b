//! `ChatTransport` over the Telegram Bot API.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};
use tracing::{debug, warn};

use guardian_agent::pipeline::{ChatTransport, TransportError};
use guardian_core::types::{ConversationId, InboundMessage, MediaPayload};

use crate::convert::{self, MediaRef};
use crate::error::TelegramError;
use crate::send;
use crate::sticker;
use crate::typing::TypingHandle;

type MessageKey = (i64, i32);

pub struct TelegramTransport {
    bot: Bot,
    max_media_bytes: u64,
    /// Files behind messages still being handled, keyed by (chat, message).
    media: DashMap<MessageKey, MediaRef>,
    /// One indicator per chat, shared by every generation in flight there.
    typing: DashMap<i64, TypingSlot>,
}

struct TypingSlot {
    users: usize,
    _handle: TypingHandle,
}

impl TelegramTransport {
    pub fn new(bot: Bot, max_media_bytes: u64) -> Self {
        Self {
            bot,
            max_media_bytes,
            media: DashMap::new(),
            typing: DashMap::new(),
        }
    }

    /// Remember the file behind `msg` so the pipeline can download it.
    pub fn track_media(&self, msg: &Message) {
        if let Some(media) = convert::media_ref(msg) {
            self.media.insert((msg.chat.id.0, msg.id.0), media);
        }
    }

    /// Drop the file reference once the message has been handled.
    pub fn forget_media(&self, msg: &InboundMessage) {
        if let Ok(key) = message_key(msg) {
            self.media.remove(&key);
        }
    }

    async fn download(&self, media: &MediaRef) -> Result<Vec<u8>, TelegramError> {
        let file = self.bot.get_file(&media.file_id).await?;

        let size = u64::from(file.size);
        if size > self.max_media_bytes {
            return Err(TelegramError::MediaTooLarge {
                size,
                max: self.max_media_bytes,
            });
        }

        let mut buf = Vec::with_capacity(file.size as usize);
        self.bot.download_file(&file.path, &mut buf).await?;
        Ok(buf)
    }
}

fn chat_id(id: &ConversationId) -> Result<ChatId, TelegramError> {
    id.as_str()
        .parse()
        .map(ChatId)
        .map_err(|_| TelegramError::InvalidChatId(id.to_string()))
}

fn message_key(msg: &InboundMessage) -> Result<MessageKey, TelegramError> {
    let chat = chat_id(&msg.conversation_id)?;
    let id = msg
        .message_id
        .parse()
        .map_err(|_| TelegramError::InvalidMessageId(msg.message_id.clone()))?;
    Ok((chat.0, id))
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, to: &ConversationId, text: &str) -> Result<(), TransportError> {
        send::send_text(&self.bot, chat_id(to)?, text, None).await?;
        Ok(())
    }

    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), TransportError> {
        let (chat, id) = message_key(msg)?;
        send::send_text(&self.bot, ChatId(chat), text, Some(MessageId(id))).await?;
        Ok(())
    }

    async fn send_sticker(
        &self,
        to: &ConversationId,
        media: &MediaPayload,
    ) -> Result<(), TransportError> {
        let chat = chat_id(to)?;
        let webp = sticker::to_webp(&media.data).map_err(TelegramError::from)?;
        self.bot
            .send_sticker(chat, InputFile::memory(webp).file_name("sticker.webp"))
            .await
            .map_err(TelegramError::from)?;
        Ok(())
    }

    async fn delete_message(
        &self,
        msg: &InboundMessage,
        for_everyone: bool,
    ) -> Result<(), TransportError> {
        if !for_everyone {
            // bots can only delete for every participant
            debug!(message_id = %msg.message_id, "deleting for everyone");
        }
        let (chat, id) = message_key(msg)?;
        self.bot
            .delete_message(ChatId(chat), MessageId(id))
            .await
            .map_err(TelegramError::from)?;
        Ok(())
    }

    async fn start_typing(&self, to: &ConversationId) {
        match chat_id(to) {
            Ok(chat) => match self.typing.entry(chat.0) {
                Entry::Occupied(mut slot) => slot.get_mut().users += 1,
                Entry::Vacant(slot) => {
                    slot.insert(TypingSlot {
                        users: 1,
                        _handle: TypingHandle::start(self.bot.clone(), chat),
                    });
                }
            },
            Err(e) => warn!(error = %e, "typing indicator not started"),
        }
    }

    async fn stop_typing(&self, to: &ConversationId) {
        let Ok(chat) = chat_id(to) else {
            return;
        };
        // the loop is aborted when the last user drops the slot
        if let Entry::Occupied(mut slot) = self.typing.entry(chat.0) {
            slot.get_mut().users -= 1;
            if slot.get().users == 0 {
                slot.remove();
            }
        }
    }

    async fn download_media(
        &self,
        msg: &InboundMessage,
    ) -> Result<Option<MediaPayload>, TransportError> {
        let key = message_key(msg)?;
        let Some(media) = self.media.get(&key).map(|m| m.value().clone()) else {
            return Ok(None);
        };

        let data = self.download(&media).await?;
        debug!(
            message_id = %msg.message_id,
            bytes = data.len(),
            mime = %media.mime_type,
            "media downloaded"
        );
        Ok(Some(MediaPayload {
            mime_type: media.mime_type,
            data,
        }))
    }
}
