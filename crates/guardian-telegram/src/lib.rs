//! Telegram transport: long-polling adapter, message conversion and the
//! `ChatTransport` implementation used by the inbound pipeline.

pub mod adapter;
pub mod convert;
pub mod error;
pub mod handler;
pub mod send;
pub mod sticker;
pub mod transport;
pub mod typing;

pub use adapter::TelegramAdapter;
pub use error::TelegramError;
pub use transport::TelegramTransport;
