//! Foundation-model completion client (non-streaming).

use crate::cloud::{join_fragments, Credential};
use crate::config::CompletionConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Client for the completion endpoint.
#[derive(Clone)]
pub struct GptClient {
    url: String,
    folder_id: String,
    options: CompletionConfig,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GptError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion api returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding completion response failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Answers a user query under a system prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn ask(
        &self,
        credential: &Credential,
        system_prompt: &str,
        query: &str,
    ) -> Result<String, GptError>;
}

impl GptClient {
    pub fn new(url: impl Into<String>, folder_id: impl Into<String>, options: CompletionConfig) -> Self {
        Self {
            url: url.into(),
            folder_id: folder_id.into(),
            options,
            client: reqwest::Client::new(),
        }
    }

    fn model_uri(&self) -> String {
        format!("gpt://{}/{}", self.folder_id, self.options.model)
    }

    fn build_request<'a>(&'a self, system_prompt: &'a str, query: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model_uri: self.model_uri(),
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens.to_string(),
                reasoning_options: ReasoningOptions {
                    mode: &self.options.reasoning_mode,
                },
            },
            messages: vec![
                Message {
                    role: "system",
                    text: system_prompt,
                },
                Message {
                    role: "user",
                    text: query,
                },
            ],
        }
    }
}

#[async_trait]
impl CompletionBackend for GptClient {
    /// POST completion. The answer is every alternative's text joined in order.
    async fn ask(
        &self,
        credential: &Credential,
        system_prompt: &str,
        query: &str,
    ) -> Result<String, GptError> {
        let body = self.build_request(system_prompt, query);
        let res = self
            .client
            .post(&self.url)
            .header("Authorization", credential.bearer())
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(GptError::Status { status, body });
        }
        let bytes = res.bytes().await?;
        let data: CompletionResponse = serde_json::from_slice(&bytes)?;
        Ok(data.text())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: CompletionOptions<'a>,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions<'a> {
    stream: bool,
    temperature: f64,
    /// The API takes int64 values as JSON strings.
    max_tokens: String,
    reasoning_options: ReasoningOptions<'a>,
}

#[derive(Debug, Serialize)]
struct ReasoningOptions<'a> {
    mode: &'a str,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: AlternativeMessage,
}

#[derive(Debug, Deserialize)]
struct AlternativeMessage {
    #[serde(default)]
    text: String,
}

impl CompletionResponse {
    fn text(&self) -> String {
        join_fragments(self.result.alternatives.iter().map(|a| a.message.text.as_str()))
    }
}
