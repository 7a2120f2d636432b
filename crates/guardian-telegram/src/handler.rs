//! Telegram message handler registered in the teloxide Dispatcher.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::UserId;
use tracing::debug;

use guardian_agent::pipeline::{handle_inbound, MessageContext};

use crate::convert;
use crate::transport::TelegramTransport;

/// Identity of the bot account, resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct BotIdentity(pub UserId);

/// Converts the update and hands it to the shared pipeline on its own task,
/// so a slow generation never stalls the dispatcher.
pub async fn handle_message<C: MessageContext + 'static>(
    msg: Message,
    ctx: Arc<C>,
    transport: Arc<TelegramTransport>,
    me: BotIdentity,
) -> ResponseResult<()> {
    let inbound = convert::to_inbound(&msg, me.0);
    if inbound.body.is_empty() && !inbound.has_media {
        return Ok(());
    }

    transport.track_media(&msg);

    tokio::spawn(async move {
        let outcome = handle_inbound(ctx.as_ref(), transport.as_ref(), &inbound).await;
        transport.forget_media(&inbound);
        debug!(
            chat = %inbound.conversation_id,
            message_id = %inbound.message_id,
            ?outcome,
            "telegram message handled"
        );
    });

    Ok(())
}
