//! Chat "typing…" indicator, refreshed while a generation is in flight.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;

/// Telegram clears the action after about five seconds.
const REFRESH: Duration = Duration::from_secs(4);

/// Background task re-sending `ChatAction::Typing`. Aborted on drop.
pub struct TypingHandle(tokio::task::JoinHandle<()>);

impl TypingHandle {
    pub fn start(bot: Bot, chat_id: ChatId) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;
                tokio::time::sleep(REFRESH).await;
            }
        });
        TypingHandle(handle)
    }
}

impl Drop for TypingHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}
