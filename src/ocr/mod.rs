//! Recognition backend abstraction and upload validation.
//!
//! The [`Recognizer`] trait lets the remote endpoint be swapped (or faked in
//! tests); [`ImageUpload::validate`] rejects bad input before anything is sent.

pub mod remote;

use tracing::warn;

use crate::error::ViewerError;
use crate::normalize::RawPayload;

/// An image file accepted from the upload form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl ImageUpload {
    /// Check type and size. `declared_mime` is the part's content type, if any.
    pub fn validate(
        filename: &str,
        declared_mime: Option<&str>,
        data: Vec<u8>,
        max_bytes: usize,
    ) -> Result<Self, ViewerError> {
        if filename.is_empty() && data.is_empty() {
            return Err(ViewerError::invalid("No file selected"));
        }

        let mime = match declared_mime {
            Some(m) if !m.is_empty() && m != "application/octet-stream" => m.to_string(),
            _ => mime_from_name(filename).unwrap_or_default().to_string(),
        };
        if !mime.starts_with("image/") {
            warn!("Rejected upload '{}' with type '{}'", filename, mime);
            return Err(ViewerError::invalid("Please upload an image file"));
        }

        if data.len() > max_bytes {
            warn!("Rejected upload '{}' ({} bytes)", filename, data.len());
            return Err(ViewerError::too_large(format!(
                "File size must not exceed {} MB",
                max_bytes / (1024 * 1024)
            )));
        }
        if data.is_empty() {
            return Err(ViewerError::invalid("The selected file is empty"));
        }

        Ok(Self {
            filename: if filename.is_empty() {
                "image".to_string()
            } else {
                filename.to_string()
            },
            mime,
            data,
        })
    }
}

fn mime_from_name(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    };
    Some(mime)
}

/// Async trait implemented by each recognition backend.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    async fn recognize(&self, upload: &ImageUpload) -> Result<RawPayload, ViewerError>;
}
