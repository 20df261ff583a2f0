//! Upload intake: type/size checks and off-thread decoding.

use std::sync::Arc;

use crate::config::UploadPolicy;
use crate::error::{DecodeError, Result, ValidationError};
use crate::layer::source::decode_bytes;
use crate::layer::{ImageContent, ImageSource};

/// A file handed over by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub data: Vec<u8>,
    /// Declared MIME type, e.g. `image/png`.
    pub mime: String,
    /// Reference persisted in profiles, if the host stored the file.
    pub asset: Option<String>,
}

impl Upload {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
            asset: None,
        }
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }
}

/// `image/PNG; name=x` -> `image/png`
fn essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Checks the declared type and the size against the policy.
pub fn validate_upload(upload: &Upload, policy: &UploadPolicy) -> Result<(), ValidationError> {
    if upload.data.is_empty() {
        return Err(ValidationError::EmptyUpload);
    }
    let mime = essence(&upload.mime);
    if !policy.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&mime)) {
        return Err(ValidationError::UnsupportedType(upload.mime.clone()));
    }
    if upload.data.len() > policy.max_bytes {
        return Err(ValidationError::TooLarge {
            size: upload.data.len(),
            max: policy.max_bytes,
        });
    }
    Ok(())
}

/// Validates and decodes an upload on the blocking pool.
///
/// The returned content carries decoded pixels and their natural size, so
/// a layer built from it never observes a half-loaded image.
pub async fn decode_upload(upload: Upload, policy: &UploadPolicy) -> Result<ImageContent> {
    validate_upload(&upload, policy)?;
    let Upload { data, mime, asset } = upload;
    let mime = essence(&mime);
    let size = data.len();

    let image = tokio::task::spawn_blocking(move || decode_bytes(&data, &mime))
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))??;

    tracing::info!(
        "decoded upload: {} bytes -> {}x{}",
        size,
        image.width(),
        image.height()
    );
    Ok(ImageContent {
        natural_size: Some(image.dimensions()),
        source: ImageSource::Decoded(Arc::new(image)),
        asset,
    })
}
