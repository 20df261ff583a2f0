//! Design layers: the images and text placed on the garment.
//!
//! A [`DesignLayer`] owns its content, its [`PlacementState`] and a version
//! counter that increments on every change. The most recent raster is
//! cached with its pixel size and dropped whenever the content changes, so
//! repeated preview frames reuse it while the layer is only being moved.
//! A resize replaces it rather than adding another entry.

pub mod source;
pub mod svg;

pub use source::{FetchedImage, ImageFetcher, ImageSource, NoFetcher, SVG_MIME};
pub use svg::FontLibrary;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use resvg::tiny_skia::Pixmap;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::placement::PlacementState;
use crate::text::TextObject;

// ============================================================================
// LayerId
// ============================================================================

/// Opaque layer identifier, unique within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct LayerId(String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for LayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Layer Content
// ============================================================================

/// What kind of content a layer holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum LayerKind {
    Image,
    Text,
}

/// A raster graphic with its natural size.
///
/// `natural_size` is only known once the image has been decoded; layers
/// built from an unresolved remote reference carry `None` until export
/// resolves them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageContent {
    pub source: ImageSource,
    pub natural_size: Option<(u32, u32)>,
    /// Opaque reference persisted in profiles (upload key, asset URL, ...).
    pub asset: Option<String>,
}

impl ImageContent {
    /// Content for pixels that are already decoded.
    pub fn decoded(image: image::RgbaImage, asset: Option<String>) -> Self {
        let natural_size = Some(image.dimensions());
        Self {
            source: ImageSource::from_image(image),
            natural_size,
            asset,
        }
    }

    /// Content for an image that will be fetched when needed.
    pub fn remote(reference: impl Into<String>) -> Self {
        let reference = reference.into();
        Self {
            source: ImageSource::remote(reference.clone()),
            natural_size: None,
            asset: Some(reference),
        }
    }
}

/// Layer payload.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerContent {
    Image(ImageContent),
    Text(TextObject),
}

impl LayerContent {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Image(_) => LayerKind::Image,
            Self::Text(_) => LayerKind::Text,
        }
    }
}

// ============================================================================
// CacheKey
// ============================================================================

/// Key for cached rasters: the device pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    width: u32,
    height: u32,
}

impl CacheKey {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ============================================================================
// DesignLayer
// ============================================================================

/// A placed image or text layer.
pub struct DesignLayer {
    id: LayerId,
    content: LayerContent,
    placement: PlacementState,
    visible: bool,
    locked: bool,
    version: u64,
    content_version: u64,
    cache: HashMap<CacheKey, (Arc<Pixmap>, u64)>,
}

impl fmt::Debug for DesignLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignLayer")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("placement", &self.placement)
            .field("visible", &self.visible)
            .field("locked", &self.locked)
            .field("version", &self.version)
            .finish()
    }
}

impl DesignLayer {
    pub fn new(id: LayerId, content: LayerContent, placement: PlacementState) -> Self {
        Self {
            id,
            content,
            placement,
            visible: true,
            locked: false,
            version: 0,
            content_version: 0,
            cache: HashMap::new(),
        }
    }

    pub fn id(&self) -> &LayerId {
        &self.id
    }

    pub fn kind(&self) -> LayerKind {
        self.content.kind()
    }

    pub fn content(&self) -> &LayerContent {
        &self.content
    }

    /// Text content, if this is a text layer.
    pub fn text(&self) -> Option<&TextObject> {
        match &self.content {
            LayerContent::Text(text) => Some(text),
            LayerContent::Image(_) => None,
        }
    }

    pub fn placement(&self) -> &PlacementState {
        &self.placement
    }

    /// Mutable access to the placement. Bumps the version.
    pub fn placement_mut(&mut self) -> &mut PlacementState {
        self.touch();
        &mut self.placement
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the current version number.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets visibility. Returns true if it changed.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        if self.visible != visible {
            self.visible = visible;
            self.touch();
            true
        } else {
            false
        }
    }

    /// Sets the lock flag. Returns true if it changed.
    pub fn set_locked(&mut self, locked: bool) -> bool {
        if self.locked != locked {
            self.locked = locked;
            self.version = self.version.wrapping_add(1);
            true
        } else {
            false
        }
    }

    /// Sets the persisted reference of an image layer. The pixels do not
    /// change, so the raster cache is kept. Returns false for text layers.
    pub fn set_asset(&mut self, asset: impl Into<String>) -> bool {
        match &mut self.content {
            LayerContent::Image(image) => {
                image.asset = Some(asset.into());
                self.touch();
                true
            }
            LayerContent::Text(_) => false,
        }
    }

    /// Replaces the content. Clears the raster cache.
    pub fn set_content(&mut self, content: LayerContent) {
        self.content = content;
        self.invalidate();
    }

    /// Invalidates the cache and increments version.
    pub fn invalidate(&mut self) {
        self.version = self.version.wrapping_add(1);
        self.content_version = self.content_version.wrapping_add(1);
        self.cache.clear();
    }

    /// Bumps the version without clearing the cache.
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    /// Pixels for drawing this layer into a `width x height` box.
    ///
    /// Text is rasterized at exactly that size. Images are converted once at
    /// their natural size and scaled by the caller. Cached rasters are reused
    /// until the content changes. Returns `Ok(None)` for remote images that
    /// have not been resolved yet.
    pub fn raster(
        &mut self,
        width: u32,
        height: u32,
        fonts: &FontLibrary,
    ) -> Result<Option<Arc<Pixmap>>, DecodeError> {
        let key = match &self.content {
            LayerContent::Text(_) => CacheKey::new(width, height),
            LayerContent::Image(image) => match (&image.source, image.natural_size) {
                (ImageSource::Remote(_), _) => return Ok(None),
                (_, Some((w, h))) => CacheKey::new(w, h),
                (_, None) => CacheKey::new(0, 0),
            },
        };
        let content_version = self.content_version;
        if let Some((pixmap, stored)) = self.cache.get(&key) {
            if *stored == content_version {
                tracing::trace!("raster cache hit for {}", self.id);
                return Ok(Some(Arc::clone(pixmap)));
            }
        }
        let pixmap = match &self.content {
            LayerContent::Text(text) => crate::text::markup::rasterize(text, width, height, fonts)?,
            LayerContent::Image(image) => {
                let pixels = match &image.source {
                    ImageSource::Decoded(pixels) => Arc::clone(pixels),
                    ImageSource::Bytes { data, mime } => Arc::new(source::decode_bytes(data, mime)?),
                    ImageSource::Remote(_) => return Ok(None),
                };
                svg::rgba_image_to_pixmap(&pixels)?
            }
        };
        let pixmap = Arc::new(pixmap);
        // One raster per layer; sizes seen during a resize are not kept.
        self.cache.clear();
        self.cache.insert(key, (Arc::clone(&pixmap), content_version));
        Ok(Some(pixmap))
    }

    /// Number of cached rasters.
    pub fn cached_rasters(&self) -> usize {
        self.cache.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
