//! Per-invocation dispatch: pick the text / photo / help / unsupported path,
//! run the cloud calls in order, and send exactly one reply.
//!
//! Degraded stages (download, format detection, recognition, completion) are
//! answered with a fixed message and reported as [`Outcome::Degraded`]. Failing
//! to get a credential or to deliver the reply is fatal: there is no one to tell.

use crate::channels::{ChatChannel, InboundMessage, MessageContent, PhotoRef, TelegramChannel, TelegramError};
use crate::cloud::{
    CompletionBackend, Credential, GptClient, LanguageCode, MetadataClient, MetadataError, OcrClient,
    TextRecognizer, TokenProvider,
};
use crate::config::Settings;
use crate::media::{self, MediaError};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const HELP_MESSAGE: &str = "Я помогу подготовить ответ на экзаменационный вопрос по дисциплине \"Операционные системы\".\nПришлите мне фотографию с вопросом или наберите его текстом.";
pub const ANSWER_FAILED_MESSAGE: &str = "Я не смог подготовить ответ на экзаменационный вопрос.";
pub const INVALID_PHOTO_MESSAGE: &str = "Я не могу обработать эту фотографию.";
pub const UNSUPPORTED_MESSAGE: &str = "Я могу обработать только текстовое сообщение или фотографию.";

/// Commands answered with [`HELP_MESSAGE`].
const HELP_COMMANDS: [&str; 2] = ["/start", "/help"];

/// Language hints sent with every recognition request.
const OCR_LANGUAGES: [LanguageCode; 1] = [LanguageCode::Auto];

/// How an invocation ended when a reply was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Help,
    Answered,
    Unsupported,
    /// A stage failed and its fixed message was sent instead.
    Degraded(Stage),
}

/// Pipeline stages that can degrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Classify,
    Recognize,
    Complete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Classify => "classify",
            Stage::Recognize => "recognize",
            Stage::Complete => "complete",
        }
    }

    /// Fixed reply sent when this stage fails.
    pub fn reply(self) -> &'static str {
        match self {
            Stage::Download | Stage::Classify | Stage::Recognize => INVALID_PHOTO_MESSAGE,
            Stage::Complete => ANSWER_FAILED_MESSAGE,
        }
    }
}

/// Fatal invocation errors. No reply reaches the user in any of these cases.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("acquiring credential failed: {0}")]
    Credential(#[from] MetadataError),
    #[error("sending reply failed: {0}")]
    Reply(#[from] TelegramError),
    #[error("invocation cancelled")]
    Cancelled,
}

/// Degraded photo stage with its cause, for logging.
#[derive(Debug, thiserror::Error)]
enum PhotoError {
    #[error("downloading photo failed: {0}")]
    Download(#[source] TelegramError),
    #[error("detecting image format failed: {0}")]
    Classify(#[source] MediaError),
    #[error("recognizing text failed: {0}")]
    Recognize(#[source] crate::cloud::OcrError),
    #[error("no text recognized")]
    NoText,
}

impl PhotoError {
    fn stage(&self) -> Stage {
        match self {
            PhotoError::Download(_) => Stage::Download,
            PhotoError::Classify(_) => Stage::Classify,
            PhotoError::Recognize(_) | PhotoError::NoText => Stage::Recognize,
        }
    }
}

/// Runs one inbound message through the services. Cheap to share across invocations.
pub struct Dispatcher {
    system_prompt: Arc<str>,
    tokens: Arc<dyn TokenProvider>,
    channel: Arc<dyn ChatChannel>,
    completion: Arc<dyn CompletionBackend>,
    recognizer: Arc<dyn TextRecognizer>,
}

impl Dispatcher {
    pub fn new(
        system_prompt: impl Into<Arc<str>>,
        tokens: Arc<dyn TokenProvider>,
        channel: Arc<dyn ChatChannel>,
        completion: Arc<dyn CompletionBackend>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            tokens,
            channel,
            completion,
            recognizer,
        }
    }

    /// Wire the real metadata, Telegram, completion and recognition clients from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.system_prompt.as_str(),
            Arc::new(MetadataClient::new(settings.metadata_addr.clone())),
            Arc::new(TelegramChannel::new(
                settings.telegram_api_base.clone(),
                settings.bot_token.clone(),
            )),
            Arc::new(GptClient::new(
                settings.completion_url.clone(),
                settings.folder_id.clone(),
                settings.completion.clone(),
            )),
            Arc::new(OcrClient::new(settings.ocr_url.clone(), settings.folder_id.clone())),
        )
    }

    /// Handle one message. Sends exactly one reply unless an error is returned
    /// before the reply stage (credential failure or cancellation).
    pub async fn dispatch(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        match &msg.content {
            MessageContent::Text(text) => self.handle_text(msg, text, cancel).await,
            MessageContent::Photos(photos) => match photos.last() {
                Some(photo) => self.handle_photo(msg, photo, cancel).await,
                None => self.handle_unsupported(msg, cancel).await,
            },
            MessageContent::Unsupported => self.handle_unsupported(msg, cancel).await,
        }
    }

    async fn handle_text(
        &self,
        msg: &InboundMessage,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        if HELP_COMMANDS.contains(&text.trim()) {
            self.reply(msg, HELP_MESSAGE, cancel).await?;
            return Ok(Outcome::Help);
        }
        let credential = self.credential(cancel).await?;
        self.answer(msg, &credential, text, cancel).await
    }

    async fn handle_photo(
        &self,
        msg: &InboundMessage,
        photo: &PhotoRef,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        let credential = self.credential(cancel).await?;
        let text = match self.recognize_photo(&credential, photo, cancel).await? {
            Ok(text) => text,
            Err(e) => {
                let stage = e.stage();
                log::warn!("dispatch: chat {}: {} stage failed: {}", msg.chat_id, stage.as_str(), e);
                self.reply(msg, stage.reply(), cancel).await?;
                return Ok(Outcome::Degraded(stage));
            }
        };
        log::debug!("dispatch: chat {}: recognized {} chars", msg.chat_id, text.chars().count());
        self.answer(msg, &credential, &text, cancel).await
    }

    async fn handle_unsupported(
        &self,
        msg: &InboundMessage,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        self.reply(msg, UNSUPPORTED_MESSAGE, cancel).await?;
        Ok(Outcome::Unsupported)
    }

    /// Download, classify and recognize. The outer result is fatal (cancellation),
    /// the inner one is a degraded stage.
    async fn recognize_photo(
        &self,
        credential: &Credential,
        photo: &PhotoRef,
        cancel: &CancellationToken,
    ) -> Result<Result<String, PhotoError>, DispatchError> {
        let image = match guarded(cancel, self.channel.download_file(&photo.file_id)).await? {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(PhotoError::Download(e))),
        };
        let format = match media::detect_image_format(&image) {
            Ok(f) => f,
            Err(e) => return Ok(Err(PhotoError::Classify(e))),
        };
        log::debug!(
            "dispatch: photo {} ({}x{}) is {}, {} bytes",
            photo.file_unique_id,
            photo.width,
            photo.height,
            format.mime_type(),
            image.len()
        );
        let recognized = guarded(
            cancel,
            self.recognizer.recognize(credential, &image, format, &OCR_LANGUAGES),
        )
        .await?;
        match recognized {
            Ok(text) if text.trim().is_empty() => Ok(Err(PhotoError::NoText)),
            Ok(text) => Ok(Ok(text)),
            Err(e) => Ok(Err(PhotoError::Recognize(e))),
        }
    }

    /// Ask the model and reply with its answer, or with the fixed failure message.
    async fn answer(
        &self,
        msg: &InboundMessage,
        credential: &Credential,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        let result = guarded(
            cancel,
            self.completion.ask(credential, &self.system_prompt, query),
        )
        .await?;
        match result {
            Ok(answer) if !answer.trim().is_empty() => {
                self.reply(msg, &answer, cancel).await?;
                Ok(Outcome::Answered)
            }
            Ok(_) => {
                log::warn!("dispatch: chat {}: completion returned no text", msg.chat_id);
                self.reply(msg, Stage::Complete.reply(), cancel).await?;
                Ok(Outcome::Degraded(Stage::Complete))
            }
            Err(e) => {
                log::warn!("dispatch: chat {}: completion failed: {}", msg.chat_id, e);
                self.reply(msg, Stage::Complete.reply(), cancel).await?;
                Ok(Outcome::Degraded(Stage::Complete))
            }
        }
    }

    async fn credential(&self, cancel: &CancellationToken) -> Result<Credential, DispatchError> {
        Ok(self.tokens.fetch_token(cancel).await?)
    }

    async fn reply(
        &self,
        msg: &InboundMessage,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<(), DispatchError> {
        guarded(cancel, self.channel.send_reply(msg.chat_id, msg.message_id, text)).await??;
        Ok(())
    }
}

/// Run `fut` unless `cancel` fires first.
async fn guarded<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, DispatchError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DispatchError::Cancelled),
        out = fut => Ok(out),
    }
}
