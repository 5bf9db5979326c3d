//! Cloud service clients: instance metadata (IAM token), completion model, text recognition.
//!
//! Every client makes exactly one HTTP attempt per call and surfaces non-success
//! status and body decoding failures as distinct error variants.

mod gpt;
mod metadata;
mod ocr;

pub use gpt::{CompletionBackend, GptClient, GptError};
pub use metadata::{Credential, MetadataClient, MetadataError, TokenProvider};
pub use ocr::{LanguageCode, OcrClient, OcrError, TextRecognizer};

/// Join response fragments in source order, separated by a single space.
pub(crate) fn join_fragments<I, S>(fragments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fragments
        .into_iter()
        .map(|f| f.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
