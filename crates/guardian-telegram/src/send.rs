//! Outbound text for Telegram: 4096-character messages, sent in order.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{MessageId, ReplyParameters};

use crate::error::TelegramError;

/// Telegram rejects messages above 4096 characters.
const CHUNK_MAX_CHARS: usize = 4096;

/// Split `text` into chunks of at most `CHUNK_MAX_CHARS` characters,
/// preferring line breaks, then spaces.
pub fn split_chunks(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > CHUNK_MAX_CHARS {
        // byte offset of the first character past the limit
        let hard = rest
            .char_indices()
            .nth(CHUNK_MAX_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(hard);

        chunks.push(rest[..cut].to_string());
        rest = rest[cut..].trim_start_matches(&['\n', ' '][..]);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Send `text`, quoting `reply_to` on the first chunk.
pub async fn send_text(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    reply_to: Option<MessageId>,
) -> Result<(), TelegramError> {
    let chunks = split_chunks(text);
    for (i, chunk) in chunks.iter().enumerate() {
        let request = bot.send_message(chat_id, chunk);
        match reply_to {
            Some(id) if i == 0 => request.reply_parameters(ReplyParameters::new(id)).await?,
            _ => request.await?,
        };

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    Ok(())
}
