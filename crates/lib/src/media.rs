//! Image format detection by leading signature bytes.

use serde::Serialize;

const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: [u8; 4] = [0x89, 0x50, 0x4E, 0x47];

/// Shortest buffer worth inspecting; the PNG signature is four bytes long.
const MIN_SIGNATURE_LEN: usize = 4;

/// Image encodings the text recognition service accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Wire name used in recognition requests.
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("image too short to identify: {0} bytes")]
    TooShort(usize),
    #[error("unsupported image signature: {0}")]
    Unsupported(String),
}

/// Identify the image encoding from its first bytes.
pub fn detect_image_format(buffer: &[u8]) -> Result<ImageFormat, MediaError> {
    if buffer.len() < MIN_SIGNATURE_LEN {
        return Err(MediaError::TooShort(buffer.len()));
    }
    if buffer.starts_with(&JPEG_SIGNATURE) {
        Ok(ImageFormat::Jpeg)
    } else if buffer.starts_with(&PNG_SIGNATURE) {
        Ok(ImageFormat::Png)
    } else {
        Err(MediaError::Unsupported(hex_prefix(buffer)))
    }
}

fn hex_prefix(buffer: &[u8]) -> String {
    buffer
        .iter()
        .take(MIN_SIGNATURE_LEN)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
