//! Channel-agnostic inbound message handling.
//!
//! Transports convert platform events into `InboundMessage`s and call
//! `handle_inbound`; moderation and chat commands are dispatched from here.

pub mod commands;
pub mod context;
pub mod inbound;

pub use commands::{help_text, Command};
pub use context::{ChatTransport, MessageContext, TransportError};
pub use inbound::{handle_inbound, InboundOutcome};
