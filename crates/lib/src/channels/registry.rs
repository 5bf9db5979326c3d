//! Chat channel seam used by the dispatcher.

use crate::channels::telegram::TelegramError;
use async_trait::async_trait;

/// Outbound side of a chat platform: replies and file retrieval.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Post `text` to `chat_id`, threaded under message `reply_to`.
    async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<(), TelegramError>;

    /// Fetch the bytes of a file by its remote id.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError>;
}
