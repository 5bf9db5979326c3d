//! Text recognition (OCR) client.
//!
//! Only the fields the bot consumes are modelled: blocks → lines → text.
//! Everything else in the upstream annotation tree is ignored by serde.

use crate::cloud::{join_fragments, Credential};
use crate::media::ImageFormat;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

const RECOGNITION_MODEL: &str = "page";

/// Language hint for recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LanguageCode {
    #[serde(rename = "*")]
    Auto,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ru")]
    Russian,
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("recognition request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("recognition api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding recognition response failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Extracts text from an image.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(
        &self,
        credential: &Credential,
        image: &[u8],
        format: ImageFormat,
        languages: &[LanguageCode],
    ) -> Result<String, OcrError>;
}

/// Client for the recognizeText endpoint.
#[derive(Clone)]
pub struct OcrClient {
    url: String,
    folder_id: String,
    client: reqwest::Client,
}

impl OcrClient {
    pub fn new(url: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            folder_id: folder_id.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TextRecognizer for OcrClient {
    async fn recognize(
        &self,
        credential: &Credential,
        image: &[u8],
        format: ImageFormat,
        languages: &[LanguageCode],
    ) -> Result<String, OcrError> {
        let body = RecognizeRequest {
            mime_type: format.mime_type(),
            language_codes: languages,
            model: RECOGNITION_MODEL,
            content: base64::engine::general_purpose::STANDARD.encode(image),
        };
        let res = self
            .client
            .post(&self.url)
            .header("Authorization", credential.bearer())
            .header("x-folder-id", &self.folder_id)
            .header("x-data-logging-enabled", "true")
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(OcrError::Status { status, body });
        }
        let bytes = res.bytes().await?;
        let data: RecognizeResponse = serde_json::from_slice(&bytes)?;
        Ok(data.text())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest<'a> {
    mime_type: &'static str,
    language_codes: &'a [LanguageCode],
    model: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    result: RecognizeResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResult {
    text_annotation: TextAnnotation,
}

#[derive(Debug, Default, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    blocks: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    #[serde(default)]
    text: String,
}

impl RecognizeResponse {
    /// Every line of every block, in source order.
    fn text(&self) -> String {
        join_fragments(
            self.result
                .text_annotation
                .blocks
                .iter()
                .flat_map(|b| b.lines.iter())
                .map(|l| l.text.as_str()),
        )
    }
}
