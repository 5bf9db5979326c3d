//! Chat channel (Telegram).
//!
//! Webhook payload types, the inbound message model the dispatcher works on,
//! and the [`ChatChannel`] seam for replies and file downloads.

mod inbound;
mod registry;
mod telegram;

pub use inbound::{InboundMessage, MessageContent, PhotoRef};
pub use registry::ChatChannel;
pub use telegram::{
    TelegramChannel, TelegramChat, TelegramError, TelegramMessage, TelegramPhotoSize,
    TelegramUpdate,
};
