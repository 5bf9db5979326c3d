//! Function invocation envelope: the JSON the serverless runtime posts per call.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header Telegram sets when the webhook was registered with a secret.
pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Inbound envelope: `{ "httpMethod", "headers", "body", "isBase64Encoded" }`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRequest {
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl FunctionRequest {
    /// Raw body bytes, base64-decoded when the runtime flagged it.
    pub fn body_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.is_base64_encoded {
            base64::engine::general_purpose::STANDARD.decode(self.body.trim())
        } else {
            Ok(self.body.as_bytes().to_vec())
        }
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Outbound envelope: `{ "statusCode", "body" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub status_code: u16,
    pub body: Option<String>,
}

impl FunctionResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: None,
        }
    }

    pub fn error(status_code: u16, reason: impl Into<String>) -> Self {
        Self {
            status_code,
            body: Some(reason.into()),
        }
    }
}
