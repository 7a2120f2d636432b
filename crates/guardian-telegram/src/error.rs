use guardian_agent::pipeline::TransportError;

/// Errors produced by the Telegram adapter.
#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("teloxide error: {0}")]
    Teloxide(#[from] teloxide::RequestError),

    #[error("download failed: {0}")]
    Download(#[from] teloxide::DownloadError),

    #[error("no bot token configured")]
    NoToken,

    #[error("invalid chat id: {0}")]
    InvalidChatId(String),

    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    #[error("file of {size} bytes exceeds the {max} byte limit")]
    MediaTooLarge { size: u64, max: u64 },

    #[error("sticker conversion failed: {0}")]
    Sticker(#[from] image::ImageError),
}

impl From<TelegramError> for TransportError {
    fn from(e: TelegramError) -> Self {
        match e {
            TelegramError::MediaTooLarge { size, max } => TransportError::MediaTooLarge { size, max },
            other => TransportError::Failed {
                channel: "telegram".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
