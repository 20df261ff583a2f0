//! Flattening the garment and its layers into one high-resolution PNG.
//!
//! Export runs in two phases. First every image is resolved (decoded bytes,
//! or fetched through the caller's [`ImageFetcher`]) under a single timeout;
//! nothing is drawn until all of them are ready. Then a surface of
//! `target * dpi_scale` pixels is allocated and the base and the layers are
//! painted with the same percent-to-pixel math the preview uses.
//!
//! Any layer that fails to load aborts the export. No partial composite is
//! ever returned.

use std::io::Cursor;
use std::sync::Arc;

use image::ImageFormat;
use resvg::tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::config::ExportSettings;
use crate::error::ExportError;
use crate::geometry::{PercentRect, PixelRect, SurfaceSize, deg_to_rad, pct_to_pixels};
use crate::layer::svg::{pixmap_to_rgba_image, rgba_image_to_pixmap};
use crate::layer::{DesignLayer, FontLibrary, ImageFetcher, ImageSource, LayerContent, LayerId};
use crate::text::TextObject;
use crate::text::markup;

// ============================================================================
// Request / Response
// ============================================================================

/// What a layer contributes to the composite.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportContent {
    Image(ImageSource),
    Text(TextObject),
}

/// One layer of an [`ExportRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportLayer {
    pub id: LayerId,
    pub content: ExportContent,
    pub rect: PercentRect,
    pub rotate_deg: f64,
    pub visible: bool,
}

impl ExportLayer {
    /// Snapshot of a design layer, clamping its placement if needed.
    pub fn from_layer(layer: &DesignLayer) -> Self {
        let (rect, rotate_deg) = layer.placement().sanitized();
        let content = match layer.content() {
            LayerContent::Image(image) => ExportContent::Image(image.source.clone()),
            LayerContent::Text(text) => ExportContent::Text(text.clone()),
        };
        Self {
            id: layer.id().clone(),
            content,
            rect,
            rotate_deg,
            visible: layer.is_visible(),
        }
    }
}

/// Everything needed to produce a composite.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    /// The garment photo, stretched to fill the target.
    pub base: ImageSource,
    /// Layers in paint order, bottom first.
    pub layers: Vec<ExportLayer>,
    /// Logical output size.
    pub target: SurfaceSize,
    /// Device pixels per logical pixel.
    pub dpi_scale: f64,
}

impl ExportRequest {
    pub fn new(base: ImageSource, target: SurfaceSize) -> Self {
        Self {
            base,
            layers: Vec::new(),
            target,
            dpi_scale: 1.0,
        }
    }

    pub fn with_layer(mut self, layer: ExportLayer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn with_dpi_scale(mut self, dpi_scale: f64) -> Self {
        self.dpi_scale = dpi_scale;
        self
    }
}

/// A finished composite.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

// ============================================================================
// Drawing
// ============================================================================

fn paint() -> PixmapPaint {
    PixmapPaint {
        quality: FilterQuality::Bicubic,
        ..PixmapPaint::default()
    }
}

/// Rotation about the origin, clockwise on screen.
fn rotation(rotate_deg: f64) -> Transform {
    let rad = deg_to_rad(rotate_deg);
    let (sin, cos) = (rad.sin() as f32, rad.cos() as f32);
    Transform::from_row(cos, sin, -sin, cos, 0.0, 0.0)
}

/// Draws `content` into `rect` on `canvas`, rotated about the rect center.
///
/// `base` maps logical coordinates to device pixels. Preview and export
/// both go through this function.
pub fn draw_layer(
    canvas: &mut Pixmap,
    content: &Pixmap,
    rect: PixelRect,
    rotate_deg: f64,
    base: Transform,
) {
    if rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let center = rect.center();
    let transform = base
        .pre_translate(center.x as f32, center.y as f32)
        .pre_concat(rotation(rotate_deg))
        .pre_scale(
            (rect.width / content.width() as f64) as f32,
            (rect.height / content.height() as f64) as f32,
        )
        .pre_translate(
            -(content.width() as f32) / 2.0,
            -(content.height() as f32) / 2.0,
        );
    canvas.draw_pixmap(0, 0, content.as_ref(), &paint(), transform, None);
}

/// Draws `content` stretched over the whole logical surface.
pub fn draw_base(canvas: &mut Pixmap, content: &Pixmap, surface: SurfaceSize, base: Transform) {
    let transform = base.pre_scale(
        (surface.width / content.width() as f64) as f32,
        (surface.height / content.height() as f64) as f32,
    );
    canvas.draw_pixmap(0, 0, content.as_ref(), &paint(), transform, None);
}

/// Device pixel size for a logical rect at `dpi_scale`.
pub fn device_size(rect: &PixelRect, dpi_scale: f64) -> (u32, u32) {
    SurfaceSize::new(rect.width, rect.height)
        .scaled(dpi_scale)
        .to_pixels()
}

/// Encodes a surface as PNG.
pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, ExportError> {
    let img = pixmap_to_rgba_image(pixmap);
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ExportError::Encode(e.to_string()))?;
    Ok(png)
}

// ============================================================================
// ExportPipeline
// ============================================================================

enum Resolved {
    Image(Pixmap),
    Text(TextObject),
}

struct ResolvedLayer {
    id: LayerId,
    content: Resolved,
    rect: PercentRect,
    rotate_deg: f64,
}

fn to_pixmap(layer: Option<&LayerId>, image: Arc<image::RgbaImage>) -> Result<Pixmap, ExportError> {
    rgba_image_to_pixmap(&image).map_err(|source| ExportError::Decode {
        layer: layer.cloned(),
        source,
    })
}

/// Produces composites using a fetcher for remote images.
#[derive(Debug, Clone)]
pub struct ExportPipeline<F> {
    fetcher: F,
    settings: ExportSettings,
    fonts: FontLibrary,
}

impl<F: ImageFetcher> ExportPipeline<F> {
    pub fn new(fetcher: F, settings: ExportSettings, fonts: FontLibrary) -> Self {
        Self {
            fetcher,
            settings,
            fonts,
        }
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    /// Renders and encodes the composite.
    pub async fn export(&self, request: ExportRequest) -> Result<ExportedImage, ExportError> {
        let pixmap = self.render(request).await?;
        let png = encode_png(&pixmap)?;
        tracing::info!(
            "exported {}x{} composite ({} bytes)",
            pixmap.width(),
            pixmap.height(),
            png.len()
        );
        Ok(ExportedImage {
            width: pixmap.width(),
            height: pixmap.height(),
            png,
        })
    }

    /// Renders the composite without encoding it.
    pub async fn render(&self, request: ExportRequest) -> Result<Pixmap, ExportError> {
        let dpi_scale = self.settings.clamped_dpi(request.dpi_scale);
        let target = request.target;
        let (width, height) = target.scaled(dpi_scale).to_pixels();
        if target.is_degenerate() {
            return Err(ExportError::Surface { width, height });
        }

        let timeout = self.settings.timeout();
        let (base, layers) = tokio::time::timeout(timeout, self.load_all(&request))
            .await
            .map_err(|_| ExportError::Timeout(timeout))??;

        let mut canvas = Pixmap::new(width, height).ok_or(ExportError::Surface { width, height })?;
        let base_transform = Transform::from_scale(dpi_scale as f32, dpi_scale as f32);

        draw_base(&mut canvas, &base, target, base_transform);

        for layer in &layers {
            let rect = pct_to_pixels(layer.rect, target);
            match &layer.content {
                Resolved::Image(pixmap) => {
                    draw_layer(&mut canvas, pixmap, rect, layer.rotate_deg, base_transform);
                }
                Resolved::Text(text) => {
                    let (w, h) = device_size(&rect, dpi_scale);
                    let pixmap = markup::rasterize(text, w, h, &self.fonts).map_err(|e| {
                        ExportError::Text {
                            layer: layer.id.clone(),
                            reason: e.to_string(),
                        }
                    })?;
                    draw_layer(&mut canvas, &pixmap, rect, layer.rotate_deg, base_transform);
                }
            }
        }

        tracing::debug!("composited {} layers at dpi {}", layers.len(), dpi_scale);
        Ok(canvas)
    }

    /// Resolves the base and every visible layer before anything is drawn.
    async fn load_all(
        &self,
        request: &ExportRequest,
    ) -> Result<(Pixmap, Vec<ResolvedLayer>), ExportError> {
        let base = request
            .base
            .load(&self.fetcher)
            .await
            .map_err(|source| ExportError::Decode {
                layer: None,
                source,
            })?;
        let base = to_pixmap(None, base)?;

        let mut layers = Vec::with_capacity(request.layers.len());
        for layer in request.layers.iter().filter(|l| l.visible) {
            let content = match &layer.content {
                ExportContent::Image(source) => {
                    let image = source.load(&self.fetcher).await.map_err(|source| {
                        ExportError::Decode {
                            layer: Some(layer.id.clone()),
                            source,
                        }
                    })?;
                    Resolved::Image(to_pixmap(Some(&layer.id), image)?)
                }
                ExportContent::Text(text) => Resolved::Text(text.clone()),
            };
            layers.push(ResolvedLayer {
                id: layer.id.clone(),
                content,
                rect: layer.rect,
                rotate_deg: layer.rotate_deg,
            });
        }
        Ok((base, layers))
    }
}

// ============================================================================
// Tests
// ============================================================================
