//! SVG rasterization and pixel-format conversion using resvg/tiny-skia.
//!
//! Text layers and uploaded vector art both pass through here, as does the
//! conversion between `image::RgbaImage` (straight alpha) and
//! `tiny_skia::Pixmap` (premultiplied alpha) used by the compositor.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{ColorU8, Pixmap, Transform};
use resvg::usvg::{self, Options, Tree, fontdb};

use crate::error::DecodeError;

// ============================================================================
// FontLibrary
// ============================================================================

/// Shared font database used when rasterizing text.
///
/// Loading system fonts is slow, so one library is created per session and
/// cloned cheaply into every render.
#[derive(Clone)]
pub struct FontLibrary {
    db: Arc<fontdb::Database>,
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("faces", &self.db.len())
            .finish()
    }
}

impl FontLibrary {
    /// An empty library. Text renders without glyphs.
    pub fn empty() -> Self {
        Self {
            db: Arc::new(fontdb::Database::new()),
        }
    }

    /// A library with every installed system font.
    pub fn system() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!("loaded {} system font faces", db.len());
        Self { db: Arc::new(db) }
    }

    /// Adds a font from memory, e.g. a font bundled with the storefront.
    pub fn with_font_data(mut self, data: Vec<u8>) -> Self {
        Arc::make_mut(&mut self.db).load_font_data(data);
        self
    }

    pub fn face_count(&self) -> usize {
        self.db.len()
    }
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::empty()
    }
}

// ============================================================================
// SVG Rendering
// ============================================================================

/// Parses SVG markup.
pub fn parse_svg(svg_data: &[u8], fonts: &FontLibrary) -> Result<Tree, DecodeError> {
    let mut opts = Options::default();
    opts.fontdb = Arc::clone(&fonts.db);
    Tree::from_data(svg_data, &opts).map_err(|e| DecodeError::Svg(e.to_string()))
}

/// Renders SVG markup stretched to exactly `width x height` device pixels.
pub fn rasterize_svg(
    svg_data: &[u8],
    width: u32,
    height: u32,
    fonts: &FontLibrary,
) -> Result<Pixmap, DecodeError> {
    let tree = parse_svg(svg_data, fonts)?;
    render_tree(&tree, width, height)
}

/// Renders a parsed tree stretched to `width x height`.
pub fn render_tree(tree: &Tree, width: u32, height: u32) -> Result<Pixmap, DecodeError> {
    let mut pixmap = Pixmap::new(width, height).ok_or(DecodeError::Empty)?;
    let size = tree.size();
    let transform = Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(tree, transform, &mut pixmap.as_mut());
    Ok(pixmap)
}

/// Largest side, in pixels, an uploaded SVG may declare.
pub const MAX_NATURAL_SIDE: u32 = 8192;

/// Renders an uploaded SVG at its intrinsic size.
///
/// The declared size is checked before any pixels are allocated: a file of
/// a few bytes can claim to be 100000 pixels wide.
pub fn rasterize_svg_natural(svg_data: &[u8]) -> Result<RgbaImage, DecodeError> {
    let tree = parse_svg(svg_data, &FontLibrary::empty())?;
    let size: usvg::Size = tree.size();
    let (width, height) = natural_pixels(size.width() as f64, size.height() as f64)?;
    let pixmap = render_tree(&tree, width, height)?;
    Ok(pixmap_to_rgba_image(&pixmap))
}

fn natural_pixels(width: f64, height: f64) -> Result<(u32, u32), DecodeError> {
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(DecodeError::Empty);
    }
    let max = MAX_NATURAL_SIDE as f64;
    if width.ceil() > max || height.ceil() > max {
        return Err(DecodeError::TooLarge {
            width,
            height,
            max: MAX_NATURAL_SIDE,
        });
    }
    Ok((width.ceil() as u32, height.ceil() as u32))
}

// ============================================================================
// Pixel Conversion
// ============================================================================

/// Straight-alpha copy of a surface, for PNG encoding.
pub fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        let (r, g, b, a) = unpremultiply(src.red(), src.green(), src.blue(), src.alpha());
        *dst = Rgba([r, g, b, a]);
    }
    img
}

/// Converts an image::RgbaImage to a premultiplied tiny_skia Pixmap.
pub fn rgba_image_to_pixmap(img: &RgbaImage) -> Result<Pixmap, DecodeError> {
    let mut pixmap = Pixmap::new(img.width(), img.height()).ok_or(DecodeError::Empty)?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}

fn unpremultiply(r: u8, g: u8, b: u8, a: u8) -> (u8, u8, u8, u8) {
    if a == 0 {
        (0, 0, 0, 0)
    } else {
        let a_f = a as f32 / 255.0;
        (
            (r as f32 / a_f).round().min(255.0) as u8,
            (g as f32 / a_f).round().min(255.0) as u8,
            (b as f32 / a_f).round().min(255.0) as u8,
            a,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
