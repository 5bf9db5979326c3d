//! IAM token from the instance metadata service (GCE-compatible API).
//!
//! Inside a cloud function or compute instance the service answers on a
//! link-local address; the token belongs to the service account attached to
//! the execution.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Short-lived bearer token for the completion and recognition APIs.
#[derive(Clone)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata service at {addr} unreachable: {source}; is this running inside a cloud function or compute instance?")]
    Unreachable {
        addr: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("metadata service returned {status}; is a service account attached to this function or instance?")]
    NoServiceAccount { status: StatusCode },
    #[error("metadata service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("reading metadata token response failed: {0}")]
    Body(#[source] reqwest::Error),
    #[error("decoding metadata token response failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("metadata token request cancelled")]
    Cancelled,
}

/// Source of per-invocation credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// One round trip for a fresh credential. Aborts with `Cancelled` when `cancel` fires.
    async fn fetch_token(&self, cancel: &CancellationToken) -> Result<Credential, MetadataError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds.
    expires_in: i64,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: String,
}

/// Client for the metadata token endpoint.
#[derive(Clone)]
pub struct MetadataClient {
    addr: String,
    client: reqwest::Client,
}

impl MetadataClient {
    /// `addr` is a host or host:port (e.g. "169.254.169.254" or "127.0.0.1:8181").
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let addr = addr
            .trim()
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    fn token_url(&self) -> String {
        format!("http://{}{}", self.addr, TOKEN_PATH)
    }

    async fn request_token(&self) -> Result<Credential, MetadataError> {
        let res = self
            .client
            .get(self.token_url())
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|source| MetadataError::Unreachable {
                addr: self.addr.clone(),
                source,
            })?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MetadataError::NoServiceAccount { status });
        }
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(MetadataError::Status { status, body });
        }
        let bytes = res.bytes().await.map_err(MetadataError::Body)?;
        let data: TokenResponse = serde_json::from_slice(&bytes)?;
        Ok(Credential {
            token: data.access_token,
            expires_at: Utc::now() + Duration::seconds(data.expires_in),
        })
    }
}

#[async_trait]
impl TokenProvider for MetadataClient {
    async fn fetch_token(&self, cancel: &CancellationToken) -> Result<Credential, MetadataError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MetadataError::Cancelled),
            res = self.request_token() => res,
        }
    }
}
