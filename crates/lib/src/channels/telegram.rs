//! Telegram Bot API: update payloads, replies, file download and webhook management.

use crate::channels::registry::ChatChannel;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Telegram update payload (webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    /// Available sizes of a photo, smallest first.
    #[serde(default)]
    pub photo: Vec<TelegramPhotoSize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub file_unique_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GetFileResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramFile>,
}

#[derive(Debug, Deserialize)]
struct TelegramFile {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// Transport failure. The request URL is stripped since it embeds the bot token.
    #[error("telegram request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("{method} failed: {status} {body}")]
    Status {
        method: &'static str,
        status: u16,
        body: String,
    },
    #[error("decoding {method} response failed: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("getFile returned no file path for {0}")]
    MissingFilePath(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Request(e.without_url())
    }
}

/// Telegram Bot API client bound to one bot token.
pub struct TelegramChannel {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.token, file_path)
    }

    async fn check(method: &'static str, res: reqwest::Response) -> Result<reqwest::Response, TelegramError> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();
        Err(TelegramError::Status { method, status, body })
    }

    /// Send `text` to `chat_id` as a reply to `reply_to` via sendMessage.
    pub async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<(), TelegramError> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "reply_parameters": { "message_id": reply_to },
        });
        let res = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        Self::check("sendMessage", res).await?;
        Ok(())
    }

    /// Resolve a file id to its download path via getFile.
    pub async fn file_path(&self, file_id: &str) -> Result<String, TelegramError> {
        let res = self
            .client
            .get(self.method_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        let res = Self::check("getFile", res).await?;
        let bytes = res.bytes().await?;
        let data: GetFileResponse = serde_json::from_slice(&bytes).map_err(|source| {
            TelegramError::Decode {
                method: "getFile",
                source,
            }
        })?;
        if !data.ok {
            return Err(TelegramError::MissingFilePath(file_id.to_string()));
        }
        data.result
            .and_then(|f| f.file_path)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| TelegramError::MissingFilePath(file_id.to_string()))
    }

    /// Download a file's bytes: getFile, then fetch from the file endpoint.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let path = self.file_path(file_id).await?;
        log::debug!("telegram: downloading file {}", path);
        let res = self.client.get(self.file_url(&path)).send().await?;
        let res = Self::check("file download", res).await?;
        Ok(res.bytes().await?.to_vec())
    }

    /// Set webhook URL (and optional secret). Telegram then POSTs updates to the URL.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TelegramError> {
        let mut body = json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let res = self
            .client
            .post(self.method_url("setWebhook"))
            .json(&body)
            .send()
            .await?;
        Self::check("setWebhook", res).await?;
        Ok(())
    }

    /// Remove the webhook.
    pub async fn delete_webhook(&self) -> Result<(), TelegramError> {
        let res = self
            .client
            .post(self.method_url("deleteWebhook"))
            .send()
            .await?;
        Self::check("deleteWebhook", res).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_reply(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<(), TelegramError> {
        TelegramChannel::send_reply(self, chat_id, reply_to, text).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        TelegramChannel::download_file(self, file_id).await
    }
}
