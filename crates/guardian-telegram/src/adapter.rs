//! Telegram channel adapter.
//!
//! Wraps a teloxide `Bot` + `Dispatcher` and drives the long-polling event loop
//! until the process exits.

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::info;

use guardian_agent::pipeline::MessageContext;
use guardian_core::config::TelegramConfig;

use crate::error::TelegramError;
use crate::handler::{handle_message, BotIdentity};
use crate::transport::TelegramTransport;

pub struct TelegramAdapter<C: MessageContext + 'static> {
    ctx: Arc<C>,
    config: TelegramConfig,
}

impl<C: MessageContext + 'static> TelegramAdapter<C> {
    pub fn new(config: &TelegramConfig, ctx: Arc<C>) -> Self {
        Self {
            ctx,
            config: config.clone(),
        }
    }

    /// Connect to Telegram and drive the long-polling loop.
    ///
    /// Returns only if the bot cannot start (missing token, `getMe` failure).
    pub async fn run(self) -> Result<(), TelegramError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(TelegramError::NoToken);
        }

        let bot = Bot::new(&self.config.bot_token);
        let me = bot.get_me().await?;
        info!(
            username = me.user.username.as_deref().unwrap_or(""),
            "Telegram: starting long-polling dispatcher"
        );

        let transport = Arc::new(TelegramTransport::new(
            bot.clone(),
            self.config.max_media_bytes,
        ));
        let identity = BotIdentity(me.user.id);

        let handler = Update::filter_message().endpoint(handle_message::<C>);

        Dispatcher::builder(bot, handler)
            .dependencies(dptree::deps![Arc::clone(&self.ctx), transport, identity])
            .default_handler(|_upd| async {})
            .build()
            .dispatch()
            .await;

        Ok(())
    }
}
