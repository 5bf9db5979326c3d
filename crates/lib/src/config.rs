//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.cheatsheet/config.json`) and the
//! environment the function runtime provides. [`Settings`] is the resolved,
//! immutable view built once at startup and shared by every invocation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level file config. Every field is optional; env overrides apply on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cloud folder, metadata service and API endpoints.
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Completion model options.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Where the system prompt is mounted.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Telegram bot settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Listener bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for HTTP (default 8080). Overridden by PORT env.
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_server_bind")]
    pub bind: String,
}

fn default_server_port() -> u16 {
    8080
}

fn default_server_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
        }
    }
}

/// Cloud identifiers and endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    /// Folder the completion model and OCR calls are billed to. Overridden by FOLDER_ID env.
    pub folder_id: Option<String>,
    /// Instance metadata service host[:port]. Overridden by YC_METADATA_ADDR env.
    pub metadata_addr: Option<String>,
    /// Completion endpoint URL.
    pub completion_url: Option<String>,
    /// Text recognition endpoint URL.
    pub ocr_url: Option<String>,
}

/// Completion request options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Reasoning mode passed through as-is (e.g. "DISABLED", "ENABLED_HIDDEN").
    #[serde(default = "default_reasoning_mode")]
    pub reasoning_mode: String,
}

fn default_model() -> String {
    "yandexgpt".to_string()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_reasoning_mode() -> String {
    "DISABLED".to_string()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            reasoning_mode: default_reasoning_mode(),
        }
    }
}

/// Location of the system prompt file: `{mountPoint}/{objectKey}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptConfig {
    /// Bucket mount point. Overridden by MOUNT_POINT env.
    pub mount_point: Option<PathBuf>,
    /// Object key of the prompt inside the bucket. Overridden by BUCKET_OBJECT_KEY env.
    pub object_key: Option<String>,
}

/// Telegram bot config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env.
    pub bot_token: Option<String>,
    /// Expected X-Telegram-Bot-Api-Secret-Token. Overridden by TELEGRAM_WEBHOOK_SECRET env.
    pub webhook_secret: Option<String>,
    /// Bot API base URL (default https://api.telegram.org).
    pub api_base: Option<String>,
}

pub const DEFAULT_METADATA_ADDR: &str = "169.254.169.254";
pub const DEFAULT_COMPLETION_URL: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
pub const DEFAULT_OCR_URL: &str = "https://ocr.api.cloud.yandex.net/ocr/v1/recognizeText";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
pub const DEFAULT_MOUNT_POINT: &str = "/function/storage/mnt";
pub const DEFAULT_OBJECT_KEY: &str = "prompt.txt";

/// Resolved, read-only settings shared by all invocations.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub folder_id: String,
    pub metadata_addr: String,
    pub completion_url: String,
    pub ocr_url: String,
    pub completion: CompletionConfig,
    /// Path the system prompt was read from.
    pub prompt_path: PathBuf,
    /// Entire contents of the prompt file.
    pub system_prompt: String,
    pub bot_token: String,
    pub webhook_secret: Option<String>,
    pub telegram_api_base: String,
}

impl Settings {
    /// Resolve settings from the config file and the process environment, then read the prompt.
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve settings with an explicit env lookup. Env values win over the file;
    /// blank values count as unset.
    pub fn resolve(config: &Config, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = |key: &str| non_empty(env(key));

        let folder_id = env("FOLDER_ID")
            .or_else(|| non_empty(config.cloud.folder_id.clone()))
            .context("folder id is not configured (set FOLDER_ID or cloud.folderId)")?;
        let bot_token = env("TELEGRAM_BOT_TOKEN")
            .or_else(|| non_empty(config.telegram.bot_token.clone()))
            .context("telegram bot token is not configured (set TELEGRAM_BOT_TOKEN or telegram.botToken)")?;
        let metadata_addr = env("YC_METADATA_ADDR")
            .or_else(|| non_empty(config.cloud.metadata_addr.clone()))
            .unwrap_or_else(|| DEFAULT_METADATA_ADDR.to_string());
        let webhook_secret = env("TELEGRAM_WEBHOOK_SECRET")
            .or_else(|| non_empty(config.telegram.webhook_secret.clone()));
        let port = match env("PORT") {
            Some(p) => p
                .parse()
                .with_context(|| format!("invalid PORT value: {}", p))?,
            None => config.server.port,
        };

        let prompt_path = prompt_path(config, &env);
        let system_prompt = std::fs::read_to_string(&prompt_path)
            .with_context(|| format!("reading system prompt from {}", prompt_path.display()))?;
        log::debug!(
            "loaded system prompt from {} ({} bytes)",
            prompt_path.display(),
            system_prompt.len()
        );

        Ok(Self {
            bind: config.server.bind.trim().to_string(),
            port,
            folder_id,
            metadata_addr,
            completion_url: url_or_default(&config.cloud.completion_url, DEFAULT_COMPLETION_URL),
            ocr_url: url_or_default(&config.cloud.ocr_url, DEFAULT_OCR_URL),
            completion: config.completion.clone(),
            prompt_path,
            system_prompt,
            bot_token,
            webhook_secret,
            telegram_api_base: resolve_telegram_api_base(config),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn url_or_default(value: &Option<String>, default: &str) -> String {
    non_empty(value.clone())
        .map(|u| u.trim_end_matches('/').to_string())
        .unwrap_or_else(|| default.to_string())
}

/// `{mount point}/{object key}`, each part from env, then file, then default.
fn prompt_path(config: &Config, env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    let mount_point = env("MOUNT_POINT")
        .map(PathBuf::from)
        .or_else(|| {
            config
                .prompt
                .mount_point
                .clone()
                .filter(|p| !p.as_os_str().is_empty())
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_POINT));
    let object_key = env("BUCKET_OBJECT_KEY")
        .or_else(|| non_empty(config.prompt.object_key.clone()))
        .unwrap_or_else(|| DEFAULT_OBJECT_KEY.to_string());
    mount_point.join(object_key.trim_start_matches('/'))
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    non_empty(std::env::var("TELEGRAM_BOT_TOKEN").ok())
        .or_else(|| non_empty(config.telegram.bot_token.clone()))
}

/// Resolve the webhook secret: env TELEGRAM_WEBHOOK_SECRET overrides config.
pub fn resolve_webhook_secret(config: &Config) -> Option<String> {
    non_empty(std::env::var("TELEGRAM_WEBHOOK_SECRET").ok())
        .or_else(|| non_empty(config.telegram.webhook_secret.clone()))
}

/// Bot API base URL from config, or the public endpoint.
pub fn resolve_telegram_api_base(config: &Config) -> String {
    url_or_default(&config.telegram.api_base, DEFAULT_TELEGRAM_API_BASE)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CHEATSHEET_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".cheatsheet").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = read_config(&path)?;
    Ok((config, path))
}

fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        return Ok(Config::default());
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parsing config from {}", path.display()))
}
