//! Image sources and decoding.
//!
//! An [`ImageSource`] is what a design layer or the base garment points at.
//! Sources are resolved to pixels with [`ImageSource::load`], which goes
//! through a caller-provided [`ImageFetcher`] for remote references so that
//! the engine never reaches out to the network on its own.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use image::RgbaImage;

use super::svg::rasterize_svg_natural;
use crate::error::DecodeError;

/// Bytes declared as SVG are rasterized instead of handed to `image`.
pub const SVG_MIME: &str = "image/svg+xml";

// ============================================================================
// ImageSource
// ============================================================================

/// Where a layer's pixels come from.
#[derive(Clone, PartialEq)]
pub enum ImageSource {
    /// Encoded bytes with their declared MIME type.
    Bytes { data: Arc<[u8]>, mime: String },

    /// Already-decoded pixels.
    Decoded(Arc<RgbaImage>),

    /// An opaque reference resolved by an [`ImageFetcher`].
    Remote(String),
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes { data, mime } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("mime", mime)
                .finish(),
            Self::Decoded(img) => f
                .debug_tuple("Decoded")
                .field(&(img.width(), img.height()))
                .finish(),
            Self::Remote(reference) => f.debug_tuple("Remote").field(reference).finish(),
        }
    }
}

impl ImageSource {
    pub fn from_bytes(data: impl Into<Arc<[u8]>>, mime: impl Into<String>) -> Self {
        Self::Bytes {
            data: data.into(),
            mime: mime.into(),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self::Decoded(Arc::new(image))
    }

    pub fn remote(reference: impl Into<String>) -> Self {
        Self::Remote(reference.into())
    }

    /// The remote reference, if this is a remote source.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Remote(reference) => Some(reference),
            _ => None,
        }
    }

    /// Resolves the source to decoded pixels.
    pub async fn load<F: ImageFetcher + ?Sized>(
        &self,
        fetcher: &F,
    ) -> Result<Arc<RgbaImage>, DecodeError> {
        match self {
            Self::Decoded(img) => {
                if img.width() == 0 || img.height() == 0 {
                    return Err(DecodeError::Empty);
                }
                Ok(Arc::clone(img))
            }
            Self::Bytes { data, mime } => decode_bytes(data, mime).map(Arc::new),
            Self::Remote(reference) => {
                tracing::debug!("fetching {}", reference);
                let fetched = fetcher.fetch(reference).await?;
                decode_bytes(&fetched.data, &fetched.mime).map(Arc::new)
            }
        }
    }
}

/// Decodes encoded bytes, rasterizing SVG at its natural size.
pub fn decode_bytes(data: &[u8], mime: &str) -> Result<RgbaImage, DecodeError> {
    let img = if mime == SVG_MIME {
        rasterize_svg_natural(data)?
    } else {
        image::load_from_memory(data)?.to_rgba8()
    };
    if img.width() == 0 || img.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(img)
}

// ============================================================================
// ImageFetcher
// ============================================================================

/// Bytes returned by an [`ImageFetcher`].
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub mime: String,
}

/// Resolves remote image references through a path the host considers safe
/// (same-origin proxy, local asset store, ...).
///
/// Failures are reported, never swallowed: a layer whose image cannot be
/// fetched fails the whole export.
pub trait ImageFetcher {
    fn fetch(&self, reference: &str) -> impl Future<Output = Result<FetchedImage, DecodeError>>;
}

/// A fetcher that rejects every remote reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFetcher;

impl ImageFetcher for NoFetcher {
    async fn fetch(&self, reference: &str) -> Result<FetchedImage, DecodeError> {
        Err(DecodeError::Fetch {
            reference: reference.to_string(),
            reason: "no fetcher configured for remote images".to_string(),
        })
    }
}
