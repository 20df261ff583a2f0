//! Live preview projection.
//!
//! The renderer does not own a surface. Each animation frame the host calls
//! [`PreviewRenderer::frame`]; if the session changed since the last frame it
//! gets back a [`PreviewFrame`] with every visible layer projected onto the
//! zoomed print area, otherwise `None`. Any number of mutations between two
//! frames produce a single redraw.

use resvg::tiny_skia::{Pixmap, Transform};

use crate::compositor::{device_size, draw_layer};
use crate::error::ExportError;
use crate::geometry::{PixelRect, Point, SurfaceSize, pct_to_pixels};
use crate::interaction::{HandlePositions, handle_positions};
use crate::layer::{LayerId, LayerKind};
use crate::session::{PlacementEngine, Session};

/// One layer as it appears on the preview surface.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewLayer {
    pub id: LayerId,
    pub kind: LayerKind,
    /// Unrotated box; rotation is about its center.
    pub rect: PixelRect,
    pub rotate_deg: f64,
    pub selected: bool,
    pub locked: bool,
    /// `[nw, ne, se, sw]` after rotation.
    pub corners: [Point; 4],
    /// Set on the selected layer only.
    pub handles: Option<HandlePositions>,
}

/// Everything the host needs to redraw the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewFrame {
    /// Session revision this frame was projected from.
    pub revision: u64,
    pub surface: SurfaceSize,
    pub zoom: f64,
    /// Visible layers, bottom first.
    pub layers: Vec<PreviewLayer>,
}

/// Coalesces session changes into at most one frame per tick.
#[derive(Debug, Clone, Default)]
pub struct PreviewRenderer {
    last_revision: Option<u64>,
    dirty: bool,
}

impl PreviewRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the renderer dirty if the session moved on since the last
    /// sync. Returns the new dirty flag.
    pub fn sync(&mut self, session: &Session) -> bool {
        let revision = session.revision();
        if self.last_revision != Some(revision) {
            self.last_revision = Some(revision);
            self.dirty = true;
        }
        self.dirty
    }

    /// The frame to draw this tick, or `None` if nothing changed.
    pub fn frame(&mut self, session: &Session) -> Option<PreviewFrame> {
        if !self.sync(session) {
            return None;
        }
        self.dirty = false;
        Some(Self::project(session))
    }

    /// Forces the next [`frame`](Self::frame) to redraw.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Projects the session onto its preview surface regardless of the
    /// dirty flag.
    pub fn project(session: &Session) -> PreviewFrame {
        let surface = session.preview_surface();
        let offset = session.controller().settings().rotate_handle_offset_px;
        let layers = session
            .layers()
            .iter()
            .filter(|layer| layer.is_visible())
            .map(|layer| {
                let placement = layer.placement();
                let (pct, rotate_deg) = placement.sanitized();
                let rect = pct_to_pixels(pct, surface);
                let selected = session.selected() == Some(layer.id());
                PreviewLayer {
                    id: layer.id().clone(),
                    kind: layer.kind(),
                    rect,
                    rotate_deg,
                    selected,
                    locked: layer.is_locked(),
                    corners: rect.corners(rotate_deg),
                    handles: (selected && !layer.is_locked())
                        .then(|| handle_positions(rect, rotate_deg, offset)),
                }
            })
            .collect();
        PreviewFrame {
            revision: session.revision(),
            surface,
            zoom: session.zoom(),
            layers,
        }
    }

    /// Draws a frame's layers onto a transparent surface of the frame's
    /// size. Images that are not resolved yet are left out.
    pub fn rasterize(frame: &PreviewFrame, session: &mut Session) -> Result<Pixmap, ExportError> {
        let (width, height) = frame.surface.to_pixels();
        let mut canvas = Pixmap::new(width, height).ok_or(ExportError::Surface { width, height })?;
        let fonts = session.fonts().clone();

        for projected in &frame.layers {
            let Some(layer) = session
                .layers_mut()
                .iter_mut()
                .find(|l| l.id() == &projected.id)
            else {
                continue;
            };
            let (w, h) = device_size(&projected.rect, 1.0);
            let raster = layer.raster(w, h, &fonts).map_err(|source| ExportError::Decode {
                layer: Some(projected.id.clone()),
                source,
            })?;
            match raster {
                Some(content) => draw_layer(
                    &mut canvas,
                    &content,
                    projected.rect,
                    projected.rotate_deg,
                    Transform::identity(),
                ),
                None => tracing::trace!("{} has no raster yet", projected.id),
            }
        }
        Ok(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::interaction::Hit;
    use crate::layer::{FontLibrary, ImageContent};
    use image::{Rgba, RgbaImage};

    fn session() -> Session {
        Session::with_fonts(EngineConfig::default(), FontLibrary::empty()).unwrap()
    }

    fn red() -> ImageContent {
        ImageContent::decoded(RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255])), None)
    }

    #[test]
    fn mutations_between_frames_coalesce() {
        let mut s = session();
        let mut preview = PreviewRenderer::new();
        assert!(preview.frame(&s).is_some());
        assert!(preview.frame(&s).is_none());

        let id = s.add_image(red());
        s.pointer_down(&id, Hit::Body, Point::new(200.0, 200.0)).unwrap();
        for step in 1..=10 {
            s.pointer_move(Point::new(200.0 + step as f64, 200.0));
        }
        s.pointer_up();

        let frame = preview.frame(&s).unwrap();
        assert_eq!(frame.revision, s.revision());
        assert!(preview.frame(&s).is_none());

        preview.invalidate();
        assert!(preview.frame(&s).is_some());
    }

    #[test]
    fn projection_uses_zoomed_surface() {
        let mut s = session();
        let id = s.add_image(red());
        s.set_zoom(2.0);

        let frame = PreviewRenderer::project(&s);
        assert_eq!(frame.surface, SurfaceSize::new(800.0, 1000.0));
        let layer = &frame.layers[0];
        assert_eq!(layer.id, id);
        assert_eq!(layer.rect, PixelRect::new(240.0, 300.0, 320.0, 200.0));
        assert!(layer.selected);
        assert_eq!(layer.handles.as_ref().unwrap().resize.len(), 8);
    }

    #[test]
    fn hidden_layers_are_not_projected() {
        let mut s = session();
        let a = s.add_image(red());
        let b = s.add_image(red());
        s.set_visible(&a, false).unwrap();
        let frame = PreviewRenderer::project(&s);
        assert_eq!(frame.layers.len(), 1);
        assert_eq!(frame.layers[0].id, b);
    }

    #[test]
    fn only_selected_unlocked_layer_has_handles() {
        let mut s = session();
        let a = s.add_image(red());
        let b = s.add_image(red());
        let frame = PreviewRenderer::project(&s);
        assert!(frame.layers[0].handles.is_none());
        assert!(frame.layers[1].handles.is_some());

        s.set_locked(&b, true).unwrap();
        let frame = PreviewRenderer::project(&s);
        assert!(frame.layers[1].locked);
        assert!(frame.layers[1].handles.is_none());
        assert_eq!(frame.layers[0].id, a);
    }

    #[test]
    fn rasterized_frame_matches_projection() {
        let mut s = session();
        s.add_image(red());
        let frame = PreviewRenderer::project(&s);
        let pixmap = PreviewRenderer::rasterize(&frame, &mut s).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (400, 500));

        // Best fit covers x 120..280, y 150..250.
        let inside = pixmap.pixel(200, 200).unwrap();
        assert!(inside.red() > 200 && inside.alpha() > 200);
        let outside = pixmap.pixel(20, 20).unwrap();
        assert_eq!(outside.alpha(), 0);
    }

    #[test]
    fn unresolved_images_are_skipped() {
        let mut s = session();
        s.add_image(ImageContent::remote("uploads/later.png"));
        let frame = PreviewRenderer::project(&s);
        let pixmap = PreviewRenderer::rasterize(&frame, &mut s).unwrap();
        assert_eq!(pixmap.pixel(200, 200).unwrap().alpha(), 0);
    }
}
