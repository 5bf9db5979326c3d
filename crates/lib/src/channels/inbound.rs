//! Inbound message from a channel: what the dispatcher acts on.

use crate::channels::telegram::{TelegramMessage, TelegramPhotoSize};

/// One chat event, reduced to what the dispatcher needs.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub content: MessageContent,
}

/// Exactly one of text, photos or neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Size variants of one photo, largest last. Never empty.
    Photos(Vec<PhotoRef>),
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRef {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    pub file_size: Option<u64>,
}

impl From<TelegramPhotoSize> for PhotoRef {
    fn from(p: TelegramPhotoSize) -> Self {
        Self {
            file_id: p.file_id,
            file_unique_id: p.file_unique_id,
            width: p.width,
            height: p.height,
            file_size: p.file_size,
        }
    }
}

impl From<TelegramMessage> for InboundMessage {
    /// Text takes precedence over photos when a message somehow carries both.
    fn from(msg: TelegramMessage) -> Self {
        let content = match (msg.text, msg.photo) {
            (Some(text), _) => MessageContent::Text(text),
            (None, photos) if !photos.is_empty() => {
                MessageContent::Photos(photos.into_iter().map(PhotoRef::from).collect())
            }
            _ => MessageContent::Unsupported,
        };
        Self {
            message_id: msg.message_id,
            chat_id: msg.chat.id,
            content,
        }
    }
}

impl InboundMessage {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self.content {
            MessageContent::Text(_) => "text",
            MessageContent::Photos(_) => "photo",
            MessageContent::Unsupported => "unsupported",
        }
    }
}
