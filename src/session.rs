//! The design session: layers, selection, interaction and export.
//!
//! A [`Session`] is created by the host and owns everything that describes
//! one garment design. Every mutation bumps [`Session::revision`], which the
//! [`PreviewRenderer`](crate::PreviewRenderer) uses to coalesce redraws.
//!
//! # Layer Lifecycle
//!
//! 1. **Images** enter through [`Session::add_image_upload`], which validates
//!    and decodes before the layer exists, or [`Session::add_image`] for
//!    content the host already resolved.
//! 2. **Text** is created and edited through the session's
//!    [`TextLayerStore`]; text layers follow the store, including undo/redo.
//! 3. New layers are placed at the best-fit window and selected.
//!
//! # Example
//!
//! ```
//! use mockup_renderer::{EngineConfig, FontLibrary, Hit, Point, Session};
//!
//! let mut session = Session::with_fonts(EngineConfig::default(), FontLibrary::empty()).unwrap();
//! let id = session.add_text("SALE").unwrap();
//!
//! session.pointer_down(&id, Hit::Body, Point::new(200.0, 200.0)).unwrap();
//! session.pointer_move(Point::new(220.0, 200.0));
//! session.pointer_up();
//!
//! let placement = session.layer(&id).unwrap().placement();
//! assert_eq!(placement.left_pct(), 55.0);
//! ```

use std::collections::{BTreeSet, HashMap};

use crate::compositor::{ExportLayer, ExportPipeline, ExportRequest, ExportedImage};
use crate::config::{EngineConfig, ExportSettings};
use crate::error::{Result, ValidationError};
use crate::geometry::{Point, SurfaceSize, delta_pixels_to_pct};
use crate::interaction::{Hit, InteractionController, Key, KeyCommand, Modifiers, body_contains};
use crate::layer::{
    DesignLayer, FontLibrary, ImageContent, ImageFetcher, ImageSource, LayerContent, LayerId,
    LayerKind,
};
use crate::placement::PlacementState;
use crate::profile::{
    LayerProfile, LayerSummary, PlacementProfile, PlacementSummary, SessionProfile,
};
use crate::text::{TextLayerStore, TextObject, TextPatch};
use crate::upload::{Upload, decode_upload};

// ============================================================================
// Traits
// ============================================================================

/// Types that can be saved to and restored from a [`SessionProfile`].
pub trait Configurable {
    /// Replaces the current state with the profile's. On error nothing
    /// changes.
    fn apply_profile(&mut self, profile: &SessionProfile) -> Result<()>;

    /// Captures the current state.
    fn export_profile(&self) -> SessionProfile;
}

/// The placement operations a storefront integration relies on.
pub trait PlacementEngine {
    fn placement(&self, id: &LayerId) -> Option<&PlacementState>;

    /// Moves a layer to an explicit placement, clamped to the limits.
    fn set_placement(&mut self, id: &LayerId, placement: PlacementProfile) -> Result<(), ValidationError>;

    fn reset_to_best_fit(&mut self, id: &LayerId) -> Result<(), ValidationError>;

    /// Placement of every visible layer, for checkout.
    fn summary(&self) -> PlacementSummary;

    /// Increments on every change.
    fn revision(&self) -> u64;
}

/// What the cart receives when a design is submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub composite: ExportedImage,
    pub summary: PlacementSummary,
}

// ============================================================================
// Session
// ============================================================================

/// One garment design being edited.
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    fonts: FontLibrary,
    base: Option<ImageSource>,
    base_asset: Option<String>,
    layers: Vec<DesignLayer>,
    selected: Option<LayerId>,
    controller: InteractionController,
    texts: TextLayerStore,
    /// Placements of text layers that the store dropped, kept so that an
    /// undo puts them back where they were.
    retired: HashMap<LayerId, PlacementState>,
    zoom: f64,
    view: Option<String>,
    color: Option<String>,
    revision: u64,
    next_image: u64,
}

impl Session {
    /// Creates a session, loading system fonts if the config asks for it.
    /// Fails if the config does not validate.
    pub fn new(config: EngineConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let fonts = if config.text.load_system_fonts {
            FontLibrary::system()
        } else {
            FontLibrary::empty()
        };
        Self::with_fonts(config, fonts)
    }

    pub fn with_fonts(config: EngineConfig, fonts: FontLibrary) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            controller: InteractionController::new(config.interaction.clone()),
            texts: TextLayerStore::from_config(&config, fonts.clone()),
            config,
            fonts,
            base: None,
            base_asset: None,
            layers: Vec::new(),
            selected: None,
            retired: HashMap::new(),
            zoom: 1.0,
            view: None,
            color: None,
            revision: 0,
            next_image: 1,
        })
    }

    // ---- Accessors ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    /// Layers in paint order, bottom first.
    pub fn layers(&self) -> &[DesignLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DesignLayer] {
        &mut self.layers
    }

    pub fn layer(&self, id: &LayerId) -> Option<&DesignLayer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn selected(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    pub fn texts(&self) -> &TextLayerStore {
        &self.texts
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut InteractionController {
        &mut self.controller
    }

    pub fn base(&self) -> Option<&ImageSource> {
        self.base.as_ref()
    }

    pub fn view(&self) -> Option<&str> {
        self.view.as_deref()
    }

    pub fn color(&self) -> Option<&str> {
        self.color.as_deref()
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn print_area(&self) -> SurfaceSize {
        self.config.print_area
    }

    /// The print area at the current zoom; pointer coordinates are in this
    /// space.
    pub fn preview_surface(&self) -> SurfaceSize {
        self.config.print_area.scaled(self.zoom)
    }

    fn layer_mut(&mut self, id: &LayerId) -> Result<&mut DesignLayer, ValidationError> {
        self.layers
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))
    }

    fn unlocked_layer_mut(&mut self, id: &LayerId) -> Result<&mut DesignLayer, ValidationError> {
        let layer = self.layer_mut(id)?;
        if layer.is_locked() {
            return Err(ValidationError::LayerLocked(id.clone()));
        }
        Ok(layer)
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn best_fit_placement(&self) -> PlacementState {
        let mut placement = PlacementState::new(&self.config.best_fit, self.config.limits.clone());
        placement.set_zoom(self.zoom);
        placement
    }

    // ---- Garment ----

    /// Sets the garment photo used as the export background.
    pub fn set_base(&mut self, base: ImageSource, asset: Option<String>) {
        self.base_asset = asset.or_else(|| base.reference().map(String::from));
        self.base = Some(base);
        self.touch();
    }

    /// Records the garment view and color reported with submissions.
    pub fn set_garment(&mut self, view: Option<String>, color: Option<String>) {
        self.view = view;
        self.color = color;
        self.touch();
    }

    /// Sets the preview zoom for the session and every layer.
    pub fn set_zoom(&mut self, level: f64) {
        if !level.is_finite() {
            tracing::warn!("ignoring non-finite zoom {}", level);
            return;
        }
        let limits = &self.config.limits;
        self.zoom = level.clamp(limits.min_zoom, limits.max_zoom);
        let zoom = self.zoom;
        for layer in &mut self.layers {
            layer.placement_mut().set_zoom(zoom);
        }
        self.touch();
    }

    // ---- Layers ----

    /// Adds an image layer at the best-fit placement and selects it.
    pub fn add_image(&mut self, content: ImageContent) -> LayerId {
        let id = loop {
            let candidate = LayerId::new(format!("image-{}", self.next_image));
            self.next_image += 1;
            if self.layer(&candidate).is_none() {
                break candidate;
            }
        };
        let layer = DesignLayer::new(id.clone(), LayerContent::Image(content), self.best_fit_placement());
        self.layers.push(layer);
        self.set_selection(Some(id.clone()));
        tracing::info!("added image layer {}", id);
        self.touch();
        id
    }

    /// Validates and decodes an upload, then adds it as an image layer.
    ///
    /// No layer is created if validation or decoding fails.
    pub async fn add_image_upload(&mut self, upload: Upload) -> Result<LayerId> {
        let content = decode_upload(upload, &self.config.upload).await?;
        Ok(self.add_image(content))
    }

    /// Creates a text layer at the best-fit placement and selects it.
    pub fn add_text(&mut self, initial_text: &str) -> Result<LayerId, ValidationError> {
        let id = self.texts.create(initial_text)?.id.clone();
        self.sync_text_layers();
        self.set_selection(Some(id.clone()));
        self.touch();
        Ok(id)
    }

    pub fn update_text(&mut self, id: &LayerId, patch: TextPatch) -> Result<(), ValidationError> {
        self.unlocked_layer_mut(id)?;
        self.texts.update(id, patch)?;
        self.sync_text_layers();
        self.touch();
        Ok(())
    }

    /// Copies a text layer. The copy is offset by the configured distance
    /// both in its own transform and in its placement.
    pub fn duplicate_text(&mut self, id: &LayerId) -> Result<LayerId, ValidationError> {
        let mut placement = self
            .layer(id)
            .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))?
            .placement()
            .clone();
        placement.end_interaction();
        placement.set_selected(false);
        let offset = self.config.text.duplicate_offset_px;
        let area = self.config.print_area;
        placement.nudge(
            delta_pixels_to_pct(offset, area.height),
            delta_pixels_to_pct(offset, area.width),
        );

        let copy = self.texts.duplicate(id)?.id.clone();
        self.retired.insert(copy.clone(), placement);
        self.sync_text_layers();
        self.set_selection(Some(copy.clone()));
        self.touch();
        Ok(copy)
    }

    pub fn undo_text(&mut self) -> bool {
        let changed = self.texts.undo();
        if changed {
            self.after_history_step();
        }
        changed
    }

    pub fn redo_text(&mut self) -> bool {
        let changed = self.texts.redo();
        if changed {
            self.after_history_step();
        }
        changed
    }

    /// Text history restores its own selection; image selections survive
    /// unless the store picked a text layer.
    fn after_history_step(&mut self) {
        self.sync_text_layers();
        let selection = match self.texts.selected() {
            Some(id) => Some(id.clone()),
            None => self.selected.clone().filter(|id| self.layer(id).is_some()),
        };
        self.set_selection(selection);
        self.touch();
    }

    /// Attaches the persisted reference to an image layer, typically once
    /// an upload has been stored by the host. Profiles reject image layers
    /// without one.
    pub fn set_layer_asset(&mut self, id: &LayerId, asset: impl Into<String>) -> Result<(), ValidationError> {
        if !self.layer_mut(id)?.set_asset(asset) {
            return Err(ValidationError::InvalidStyle(format!("{id} is not an image layer")));
        }
        self.touch();
        Ok(())
    }

    /// Deletes a layer. Text layers are removed through the store, so the
    /// removal can be undone.
    pub fn remove_layer(&mut self, id: &LayerId) -> Result<(), ValidationError> {
        let kind = self.unlocked_layer_mut(id)?.kind();
        match kind {
            LayerKind::Text => {
                self.texts.delete(id)?;
                self.sync_text_layers();
            }
            LayerKind::Image => {
                self.layers.retain(|l| l.id() != id);
                self.forget(id);
            }
        }
        tracing::info!("removed layer {}", id);
        self.touch();
        Ok(())
    }

    pub fn set_visible(&mut self, id: &LayerId, visible: bool) -> Result<(), ValidationError> {
        if self.layer_mut(id)?.set_visible(visible) {
            self.touch();
        }
        Ok(())
    }

    pub fn set_locked(&mut self, id: &LayerId, locked: bool) -> Result<(), ValidationError> {
        let active = self.controller.active_layer() == Some(id);
        let layer = self.layer_mut(id)?;
        if !layer.set_locked(locked) {
            return Ok(());
        }
        if locked && active {
            layer.placement_mut().end_interaction();
            self.controller.reset();
        }
        self.touch();
        Ok(())
    }

    /// Moves a layer in paint order. The index is clamped.
    pub fn reorder_layer(&mut self, id: &LayerId, new_index: usize) -> Result<(), ValidationError> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))?;
        let target = new_index.min(self.layers.len() - 1);
        if index == target {
            return Ok(());
        }
        if self.layers[index].kind() == LayerKind::Text {
            // Text order in the store follows paint order: the new store
            // index is the number of text layers that end up below.
            let text_index = self
                .layers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .take(target)
                .filter(|(_, l)| l.kind() == LayerKind::Text)
                .count();
            self.texts.reorder(id, text_index)?;
        }
        let layer = self.layers.remove(index);
        self.layers.insert(target, layer);
        self.touch();
        Ok(())
    }

    pub fn select(&mut self, id: Option<&LayerId>) -> Result<(), ValidationError> {
        if let Some(id) = id {
            self.layer_mut(id)?;
        }
        self.set_selection(id.cloned());
        self.touch();
        Ok(())
    }

    fn set_selection(&mut self, id: Option<LayerId>) {
        for layer in &mut self.layers {
            let selected = Some(layer.id()) == id.as_ref();
            if layer.placement().is_selected() != selected {
                layer.placement_mut().set_selected(selected);
            }
        }
        let text_selection = id.as_ref().filter(|id| self.texts.get(id).is_some());
        if self.texts.select(text_selection).is_err() {
            tracing::debug!("text store rejected selection");
        }
        self.selected = id;
    }

    /// Drops references to a layer that no longer exists.
    fn forget(&mut self, id: &LayerId) {
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        if self.controller.active_layer() == Some(id) {
            self.controller.reset();
        }
    }

    /// Brings the text layers in line with the text store.
    fn sync_text_layers(&mut self) {
        let mut removed = Vec::new();
        let texts = &self.texts;
        let retired = &mut self.retired;
        self.layers.retain(|layer| {
            let orphan = layer.kind() == LayerKind::Text && texts.get(layer.id()).is_none();
            if orphan {
                let mut placement = layer.placement().clone();
                placement.end_interaction();
                placement.set_selected(false);
                retired.insert(layer.id().clone(), placement);
                removed.push(layer.id().clone());
            }
            !orphan
        });

        for object in self.texts.objects() {
            match self.layers.iter_mut().find(|l| l.id() == &object.id) {
                Some(layer) => {
                    if layer.text() != Some(object) {
                        layer.set_content(LayerContent::Text(object.clone()));
                    }
                }
                None => {
                    let placement = self.retired.remove(&object.id).unwrap_or_else(|| {
                        let mut placement = PlacementState::new(
                            &self.config.best_fit,
                            self.config.limits.clone(),
                        );
                        placement.set_zoom(self.zoom);
                        placement
                    });
                    self.layers.push(DesignLayer::new(
                        object.id.clone(),
                        LayerContent::Text(object.clone()),
                        placement,
                    ));
                }
            }
        }

        // Text layers fill the slots text already occupies, in store order.
        let mut text_layers = HashMap::new();
        let slots: Vec<Option<DesignLayer>> = self
            .layers
            .drain(..)
            .map(|layer| match layer.kind() {
                LayerKind::Text => {
                    text_layers.insert(layer.id().clone(), layer);
                    None
                }
                LayerKind::Image => Some(layer),
            })
            .collect();
        let mut in_order = self
            .texts
            .objects()
            .iter()
            .filter_map(|object| text_layers.remove(&object.id));
        self.layers = slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| in_order.next()))
            .collect();

        for id in removed {
            self.forget(&id);
        }
    }

    // ---- Pointer & Keyboard ----

    /// The layer and part under `pointer`, topmost first. Handles only
    /// count on the selected layer.
    pub fn hit_test(&self, pointer: Point) -> Option<(LayerId, Hit)> {
        let surface = self.preview_surface();
        if let Some(layer) = self.selected.as_ref().and_then(|id| self.layer(id)) {
            if layer.is_visible() {
                if let Some(hit) = self.controller.hit_test(layer.placement(), surface, pointer) {
                    return Some((layer.id().clone(), hit));
                }
            }
        }
        self.layers
            .iter()
            .rev()
            .filter(|l| l.is_visible())
            .find(|l| body_contains(l.placement(), surface, pointer))
            .map(|l| (l.id().clone(), Hit::Body))
    }

    /// Starts dragging, resizing or rotating a layer and selects it.
    pub fn pointer_down(&mut self, id: &LayerId, hit: Hit, pointer: Point) -> Result<(), ValidationError> {
        let index = self
            .layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))?;
        self.controller.pointer_down(&mut self.layers[index], hit, pointer)?;
        self.set_selection(Some(id.clone()));
        self.touch();
        Ok(())
    }

    /// Forwards a pointer move to the layer under interaction.
    pub fn pointer_move(&mut self, pointer: Point) -> bool {
        let surface = self.preview_surface();
        let Some(id) = self.controller.active_layer().cloned() else {
            return false;
        };
        let Some(layer) = self.layers.iter_mut().find(|l| l.id() == &id) else {
            self.controller.reset();
            return false;
        };
        let moved = self.controller.pointer_move(layer, pointer, surface);
        if moved {
            self.touch();
        }
        moved
    }

    pub fn pointer_up(&mut self) {
        let Some(id) = self.controller.active_layer().cloned() else {
            return;
        };
        match self.layers.iter_mut().find(|l| l.id() == &id) {
            Some(layer) => self.controller.pointer_up(layer),
            None => self.controller.reset(),
        }
        self.touch();
    }

    /// Handles a key press on the selected layer. Returns the command that
    /// was applied, if the key maps to one.
    pub fn key_press(&mut self, key: Key, modifiers: Modifiers) -> Result<Option<KeyCommand>, ValidationError> {
        let Some(id) = self.selected.clone() else {
            return Ok(None);
        };
        let Some(command) = self.controller.key_command(key, modifiers) else {
            return Ok(None);
        };
        match command {
            KeyCommand::Remove => self.remove_layer(&id)?,
            KeyCommand::Deselect => self.select(None)?,
            _ => {
                let best_fit = self.config.best_fit;
                let index = self
                    .layers
                    .iter()
                    .position(|l| l.id() == &id)
                    .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))?;
                self.controller.apply_key(&mut self.layers[index], command, &best_fit)?;
                self.touch();
            }
        }
        Ok(Some(command))
    }

    // ---- Export ----

    /// Snapshot of the design for a pipeline with `settings`. Target size
    /// and dpi come from the pipeline, never from the session's config.
    pub fn export_request(&self, settings: &ExportSettings) -> Result<ExportRequest, ValidationError> {
        let base = self.base.clone().ok_or(ValidationError::MissingBase)?;
        Ok(ExportRequest {
            base,
            layers: self.layers.iter().map(ExportLayer::from_layer).collect(),
            target: settings.target,
            dpi_scale: settings.dpi_scale,
        })
    }

    pub async fn export<F: ImageFetcher>(&self, pipeline: &ExportPipeline<F>) -> Result<ExportedImage> {
        let request = self.export_request(pipeline.settings())?;
        Ok(pipeline.export(request).await?)
    }

    /// Exports the composite and pairs it with the placement summary.
    pub async fn submit<F: ImageFetcher>(&self, pipeline: &ExportPipeline<F>) -> Result<Submission> {
        let composite = self.export(pipeline).await?;
        Ok(Submission {
            composite,
            summary: self.summary(),
        })
    }
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl PlacementEngine for Session {
    fn placement(&self, id: &LayerId) -> Option<&PlacementState> {
        self.layer(id).map(DesignLayer::placement)
    }

    fn set_placement(&mut self, id: &LayerId, placement: PlacementProfile) -> Result<(), ValidationError> {
        let state = self.unlocked_layer_mut(id)?.placement_mut();
        let rect = placement.percent_rect();
        state.set_size(rect.width, rect.height);
        state.set_position(rect.top, rect.left);
        state.set_rotation(placement.rotate_deg);
        self.touch();
        Ok(())
    }

    fn reset_to_best_fit(&mut self, id: &LayerId) -> Result<(), ValidationError> {
        let best_fit = self.config.best_fit;
        self.unlocked_layer_mut(id)?.placement_mut().reset_to(&best_fit);
        self.touch();
        Ok(())
    }

    fn summary(&self) -> PlacementSummary {
        PlacementSummary {
            view: self.view.clone(),
            color: self.color.clone(),
            layers: self
                .layers
                .iter()
                .filter(|l| l.is_visible())
                .map(|l| LayerSummary {
                    id: l.id().clone(),
                    kind: l.kind(),
                    placement: PlacementProfile::from(l.placement()),
                })
                .collect(),
        }
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

impl Configurable for Session {
    fn apply_profile(&mut self, profile: &SessionProfile) -> Result<()> {
        let mut seen = BTreeSet::new();
        let mut layers = Vec::with_capacity(profile.layers.len());
        let mut texts: Vec<TextObject> = Vec::new();

        for entry in &profile.layers {
            if !seen.insert(entry.id.clone()) {
                return Err(ValidationError::InvalidStyle(format!("duplicate layer id {}", entry.id)).into());
            }
            let content = match entry.kind {
                LayerKind::Image => match &entry.asset {
                    Some(asset) => LayerContent::Image(ImageContent::remote(asset.clone())),
                    None => return Err(ValidationError::MissingAsset(entry.id.clone()).into()),
                },
                LayerKind::Text => {
                    let mut text = entry.text.clone().ok_or_else(|| {
                        ValidationError::InvalidStyle(format!("text layer {} has no text", entry.id))
                    })?;
                    text.id = entry.id.clone();
                    let text = text.validated()?;
                    texts.push(text.clone());
                    LayerContent::Text(text)
                }
            };
            let mut placement = PlacementState::from_rect(
                entry.placement.percent_rect(),
                entry.placement.rotate_deg,
                self.config.limits.clone(),
            );
            placement.set_zoom(profile.zoom);
            let mut layer = DesignLayer::new(entry.id.clone(), content, placement);
            layer.set_visible(entry.visible);
            layer.set_locked(entry.locked);
            layers.push(layer);
        }

        self.texts.reset(texts)?;
        self.layers = layers;
        self.retired.clear();
        self.selected = None;
        self.controller.reset();
        self.base = profile.base.clone().map(ImageSource::remote);
        self.base_asset = profile.base.clone();
        self.view = profile.view.clone();
        self.color = profile.color.clone();
        self.zoom = if profile.zoom.is_finite() {
            profile.zoom.clamp(self.config.limits.min_zoom, self.config.limits.max_zoom)
        } else {
            1.0
        };
        tracing::info!("applied profile with {} layers", self.layers.len());
        self.touch();
        Ok(())
    }

    fn export_profile(&self) -> SessionProfile {
        let layers = self
            .layers
            .iter()
            .map(|layer| {
                let placement = PlacementProfile::from(layer.placement());
                let mut entry = match layer.content() {
                    LayerContent::Image(image) => LayerProfile {
                        id: layer.id().clone(),
                        kind: LayerKind::Image,
                        placement,
                        visible: true,
                        locked: false,
                        asset: image.asset.clone(),
                        text: None,
                    },
                    LayerContent::Text(text) => LayerProfile::text(text.clone(), placement),
                };
                entry.visible = layer.is_visible();
                entry.locked = layer.is_locked();
                entry
            })
            .collect();
        SessionProfile {
            view: self.view.clone(),
            color: self.color.clone(),
            base: self.base_asset.clone(),
            zoom: self.zoom,
            layers,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ExportError};
    use crate::layer::NoFetcher;
    use crate::placement::ResizeDirection;
    use crate::test_support::png_bytes;
    use image::{Rgba, RgbaImage};

    fn session() -> Session {
        Session::with_fonts(EngineConfig::default(), FontLibrary::empty()).unwrap()
    }

    fn image() -> ImageContent {
        ImageContent::decoded(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255])), None)
    }

    fn pipeline() -> ExportPipeline<NoFetcher> {
        let mut settings = EngineConfig::default().export;
        settings.target = SurfaceSize::new(100.0, 100.0);
        ExportPipeline::new(NoFetcher, settings, FontLibrary::empty())
    }

    #[test]
    fn new_layers_are_placed_at_best_fit_and_selected() {
        let mut s = session();
        let a = s.add_image(image());
        let b = s.add_image(image());

        assert_ne!(a, b);
        assert_eq!(s.selected(), Some(&b));
        assert!(s.layer(&b).unwrap().placement().is_selected());
        assert!(!s.layer(&a).unwrap().placement().is_selected());
        assert_eq!(
            s.layer(&a).unwrap().placement().percent_rect(),
            s.config().best_fit.percent_rect()
        );
    }

    #[test]
    fn revision_moves_on_every_change() {
        let mut s = session();
        let r0 = s.revision();
        let id = s.add_image(image());
        let r1 = s.revision();
        assert!(r1 > r0);
        s.set_visible(&id, false).unwrap();
        assert!(s.revision() > r1);
        let r2 = s.revision();
        s.set_visible(&id, false).unwrap();
        assert_eq!(s.revision(), r2);
    }

    #[test]
    fn pointer_flow_moves_the_selected_layer() {
        let mut s = session();
        let id = s.add_image(image());
        // Best fit on 400x500: x 120..280, y 150..250.
        let (hit_id, hit) = s.hit_test(Point::new(200.0, 200.0)).unwrap();
        assert_eq!((hit_id.clone(), hit), (id.clone(), Hit::Body));

        s.pointer_down(&hit_id, hit, Point::new(200.0, 200.0)).unwrap();
        assert!(s.pointer_move(Point::new(160.0, 250.0)));
        s.pointer_up();

        let p = s.layer(&id).unwrap().placement();
        assert!((p.left_pct() - 40.0).abs() < 1e-9);
        assert!((p.top_pct() - 40.0).abs() < 1e-9);
        assert!(!p.is_interacting());
        assert!(!s.pointer_move(Point::new(0.0, 0.0)));
    }

    #[test]
    fn handles_only_hit_on_selected_layer() {
        let mut s = session();
        let a = s.add_image(image());
        let b = s.add_image(image());
        // se corner of the best-fit box.
        let corner = Point::new(280.0, 250.0);
        assert_eq!(s.hit_test(corner), Some((b.clone(), Hit::Handle(ResizeDirection::Se))));
        s.select(None).unwrap();
        assert_eq!(s.hit_test(corner), Some((b, Hit::Body)));
        s.select(Some(&a)).unwrap();
        assert_eq!(s.hit_test(corner), Some((a, Hit::Handle(ResizeDirection::Se))));
    }

    #[test]
    fn zoom_scales_pointer_space() {
        let mut s = session();
        let id = s.add_image(image());
        s.set_zoom(2.0);
        assert_eq!(s.preview_surface(), SurfaceSize::new(800.0, 1000.0));
        assert_eq!(s.layer(&id).unwrap().placement().zoom(), 2.0);

        s.pointer_down(&id, Hit::Body, Point::new(400.0, 400.0)).unwrap();
        s.pointer_move(Point::new(480.0, 400.0));
        s.pointer_up();
        assert!((s.layer(&id).unwrap().placement().left_pct() - 60.0).abs() < 1e-9);

        s.set_zoom(10.0);
        assert_eq!(s.zoom(), 3.0);
    }

    #[test]
    fn text_layers_follow_the_store() {
        let mut s = session();
        let id = s.add_text("SALE").unwrap();
        assert_eq!(s.layer(&id).unwrap().kind(), LayerKind::Text);

        s.update_text(&id, TextPatch::text("50% OFF")).unwrap();
        assert_eq!(s.layer(&id).unwrap().text().unwrap().text, "50% OFF");

        assert!(s.undo_text());
        assert_eq!(s.layer(&id).unwrap().text().unwrap().text, "SALE");
        assert!(s.redo_text());
        assert_eq!(s.layer(&id).unwrap().text().unwrap().text, "50% OFF");
    }

    #[test]
    fn undoing_a_text_removal_restores_its_placement() {
        let mut s = session();
        let id = s.add_text("BACK").unwrap();
        s.layers_mut()[0].placement_mut().set_position(70.0, 20.0);

        s.remove_layer(&id).unwrap();
        assert!(s.layer(&id).is_none());
        assert_eq!(s.selected(), None);

        assert!(s.undo_text());
        let p = s.layer(&id).unwrap().placement();
        assert_eq!((p.top_pct(), p.left_pct()), (70.0, 20.0));
    }

    #[test]
    fn duplicate_text_offsets_placement() {
        let mut s = session();
        let id = s.add_text("TWICE").unwrap();
        let copy = s.duplicate_text(&id).unwrap();
        let original = s.layer(&id).unwrap().placement().clone();
        let dup = s.layer(&copy).unwrap().placement();
        // 20px on 400x500
        assert!((dup.left_pct() - original.left_pct() - 5.0).abs() < 1e-9);
        assert!((dup.top_pct() - original.top_pct() - 4.0).abs() < 1e-9);
        assert_eq!(s.selected(), Some(&copy));
    }

    #[test]
    fn locked_layers_refuse_edits() {
        let mut s = session();
        let id = s.add_text("LOCK").unwrap();
        s.set_locked(&id, true).unwrap();

        assert_eq!(
            s.update_text(&id, TextPatch::text("x")),
            Err(ValidationError::LayerLocked(id.clone()))
        );
        assert!(s.pointer_down(&id, Hit::Body, Point::new(200.0, 200.0)).is_err());
        assert!(s.remove_layer(&id).is_err());
        assert!(s.reset_to_best_fit(&id).is_err());
        assert_eq!(s.layer(&id).unwrap().text().unwrap().text, "LOCK");
    }

    #[test]
    fn keyboard_commands() {
        let mut s = session();
        let id = s.add_image(image());

        let cmd = s.key_press(Key::ArrowRight, Modifiers::shift()).unwrap();
        assert!(matches!(cmd, Some(KeyCommand::Nudge { .. })));
        assert_eq!(s.layer(&id).unwrap().placement().left_pct(), 55.0);

        let reset = Modifiers {
            ctrl: true,
            shift: true,
            ..Modifiers::NONE
        };
        s.key_press(Key::Char('f'), reset).unwrap();
        assert_eq!(s.layer(&id).unwrap().placement().left_pct(), 50.0);

        s.key_press(Key::Escape, Modifiers::NONE).unwrap();
        assert_eq!(s.selected(), None);
        assert_eq!(s.key_press(Key::ArrowUp, Modifiers::NONE).unwrap(), None);

        s.select(Some(&id)).unwrap();
        s.key_press(Key::Delete, Modifiers::NONE).unwrap();
        assert!(s.layers().is_empty());
    }

    #[test]
    fn removing_the_active_layer_resets_interaction() {
        let mut s = session();
        let a = s.add_image(image());
        let b = s.add_image(image());
        s.pointer_down(&a, Hit::Body, Point::new(200.0, 200.0)).unwrap();
        assert!(matches!(
            s.pointer_down(&b, Hit::Body, Point::new(200.0, 200.0)),
            Err(ValidationError::InteractionBusy { .. })
        ));
        s.remove_layer(&a).unwrap();
        assert!(s.controller().active_layer().is_none());
        assert!(s.pointer_down(&b, Hit::Body, Point::new(200.0, 200.0)).is_ok());
    }

    #[test]
    fn placement_engine_operations() {
        let mut s = session();
        let id = s.add_image(image());
        s.set_placement(
            &id,
            PlacementProfile {
                top_pct: 10.0,
                left_pct: 20.0,
                width_pct: 95.0,
                height_pct: 5.0,
                rotate_deg: 30.0,
            },
        )
        .unwrap();
        let p = s.placement(&id).unwrap();
        assert_eq!((p.width_pct(), p.height_pct()), (90.0, 10.0));
        assert_eq!(p.rotate_deg(), 30.0);

        s.reset_to_best_fit(&id).unwrap();
        assert_eq!(s.placement(&id).unwrap().percent_rect(), s.config().best_fit.percent_rect());
        assert_eq!(s.placement(&id).unwrap().rotate_deg(), 0.0);
    }

    #[test]
    fn profile_round_trip() {
        let mut s = session();
        s.set_garment(Some("front".into()), Some("heather".into()));
        s.set_base(ImageSource::remote("garments/tee.png"), None);
        s.add_image(ImageContent::remote("uploads/logo.png"));
        let text = s.add_text("CREW").unwrap();
        s.set_locked(&text, true).unwrap();

        let profile = s.export_profile();
        assert_eq!(profile.base.as_deref(), Some("garments/tee.png"));
        assert_eq!(profile.layers.len(), 2);

        let mut restored = session();
        restored.apply_profile(&profile).unwrap();
        assert_eq!(restored.export_profile(), profile);
        assert_eq!(restored.texts().len(), 1);
        assert!(restored.layer(&text).unwrap().is_locked());
        assert_eq!(restored.view(), Some("front"));
        match restored.layers()[0].content() {
            LayerContent::Image(image) => {
                assert_eq!(image.source.reference(), Some("uploads/logo.png"))
            }
            LayerContent::Text(_) => panic!("expected image layer"),
        }
    }

    #[test]
    fn invalid_profile_changes_nothing() {
        let mut s = session();
        let keep = s.add_image(image());

        let mut bad = TextObject::new(LayerId::from("t"), "arc");
        bad.path = crate::text::TextPath::Arc {
            radius: 0.0,
            invert: false,
        };
        let profile = SessionProfile::new().with_layer(LayerProfile::text(
            bad,
            PlacementProfile::from(&PlacementState::default()),
        ));
        let before = s.revision();
        assert!(matches!(
            s.apply_profile(&profile),
            Err(Error::Validation(ValidationError::DegenerateArc(_)))
        ));
        assert!(s.layer(&keep).is_some());
        assert_eq!(s.revision(), before);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = EngineConfig::default();
        config.limits.min_size_pct = 60.0;
        config.limits.max_size_pct = 20.0;
        assert!(matches!(
            Session::with_fonts(config, FontLibrary::empty()),
            Err(ValidationError::InvalidConfig(_))
        ));

        let mut config = EngineConfig::default();
        config.limits.min_zoom = 5.0;
        config.limits.max_zoom = 0.5;
        assert!(Session::new(config).is_err());
    }

    #[test]
    fn applying_a_profile_clears_text_history() {
        let mut s = session();
        s.add_text("OLD").unwrap();
        s.apply_profile(&SessionProfile::new()).unwrap();

        assert!(!s.texts().can_undo());
        assert!(!s.undo_text());
        assert!(s.layers().is_empty());
        assert!(s.texts().is_empty());
    }

    #[tokio::test]
    async fn image_without_asset_does_not_round_trip_silently() {
        let mut s = session();
        let id = s
            .add_image_upload(Upload::new(png_bytes(4, 4, [0, 0, 0, 255]), "image/png"))
            .await
            .unwrap();
        let profile = s.export_profile();
        assert!(profile.layers[0].asset.is_none());

        let mut restored = session();
        let keep = restored.add_text("KEEP").unwrap();
        let before = restored.revision();
        match restored.apply_profile(&profile) {
            Err(Error::Validation(ValidationError::MissingAsset(missing))) => assert_eq!(missing, id),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(restored.revision(), before);
        assert!(restored.layer(&keep).is_some());

        // Once the host stores the upload, the layer persists.
        s.set_layer_asset(&id, "uploads/logo.png").unwrap();
        let profile = s.export_profile();
        restored.apply_profile(&profile).unwrap();
        assert_eq!(restored.layers().len(), 1);
        assert_eq!(restored.layers()[0].id(), &id);

        assert!(s.set_layer_asset(&LayerId::from("nope"), "x").is_err());
        let text = s.add_text("T").unwrap();
        assert!(s.set_layer_asset(&text, "x").is_err());
    }

    #[test]
    fn text_reorder_follows_paint_order() {
        let mut s = session();
        let a = s.add_text("A").unwrap();
        let img = s.add_image(image());
        let b = s.add_text("B").unwrap();

        let paint = |s: &Session| s.layers().iter().map(|l| l.id().clone()).collect::<Vec<_>>();
        let store = |s: &Session| s.texts().objects().iter().map(|o| o.id.clone()).collect::<Vec<_>>();

        s.reorder_layer(&b, 0).unwrap();
        assert_eq!(paint(&s), vec![b.clone(), a.clone(), img.clone()]);
        assert_eq!(store(&s), vec![b.clone(), a.clone()]);

        // Moving text past an image only keeps the store order.
        s.reorder_layer(&a, 2).unwrap();
        assert_eq!(paint(&s), vec![b.clone(), img.clone(), a.clone()]);
        assert_eq!(store(&s), vec![b.clone(), a.clone()]);

        // Restored text takes its store position among the text layers
        // instead of landing on top.
        s.remove_layer(&b).unwrap();
        assert_eq!(paint(&s), vec![img.clone(), a.clone()]);
        assert!(s.undo_text());
        assert_eq!(store(&s), vec![b.clone(), a.clone()]);
        assert_eq!(paint(&s), vec![img.clone(), b.clone(), a.clone()]);
        assert!(s.undo_text());
        assert_eq!(store(&s), vec![a.clone(), b.clone()]);
        assert_eq!(paint(&s), vec![img.clone(), a.clone(), b.clone()]);
    }

    #[tokio::test]
    async fn upload_creates_layer_only_on_success() {
        let mut s = session();
        let id = s
            .add_image_upload(Upload::new(png_bytes(6, 3, [1, 1, 1, 255]), "image/png"))
            .await
            .unwrap();
        match s.layer(&id).unwrap().content() {
            LayerContent::Image(image) => assert_eq!(image.natural_size, Some((6, 3))),
            LayerContent::Text(_) => panic!("expected image layer"),
        }

        let err = s
            .add_image_upload(Upload::new(vec![9, 9, 9], "image/png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(s.layers().len(), 1);
    }

    #[tokio::test]
    async fn submit_pairs_composite_with_summary() {
        let mut s = session();
        assert!(matches!(
            s.export(&pipeline()).await,
            Err(Error::Validation(ValidationError::MissingBase))
        ));

        s.set_base(
            ImageSource::from_image(RgbaImage::from_pixel(8, 8, Rgba([255, 255, 255, 255]))),
            None,
        );
        s.set_garment(Some("front".into()), Some("white".into()));
        let logo = s.add_image(image());
        let hidden = s.add_image(image());
        s.set_visible(&hidden, false).unwrap();

        // The session config still says 2000x2000; the pipeline decides.
        assert_eq!(s.config().export.target, SurfaceSize::new(2000.0, 2000.0));
        let submission = s.submit(&pipeline()).await.unwrap();
        assert_eq!((submission.composite.width, submission.composite.height), (100, 100));
        assert_eq!(submission.summary.view.as_deref(), Some("front"));
        assert_eq!(submission.summary.layers.len(), 1);
        assert_eq!(submission.summary.layers[0].id, logo);
        assert_eq!(submission.summary.layers[0].placement.width_pct, 40.0);
    }

    #[tokio::test]
    async fn export_scales_by_pipeline_dpi() {
        let mut s = session();
        s.set_base(ImageSource::from_image(RgbaImage::new(2, 2)), None);

        let mut settings = EngineConfig::default().export;
        settings.target = SurfaceSize::new(50.0, 40.0);
        settings.dpi_scale = 2.0;
        let request = s.export_request(&settings).unwrap();
        assert_eq!(request.target, settings.target);
        assert_eq!(request.dpi_scale, 2.0);

        let pipeline = ExportPipeline::new(NoFetcher, settings, FontLibrary::empty());
        let image = s.export(&pipeline).await.unwrap();
        assert_eq!((image.width, image.height), (100, 80));
    }

    #[tokio::test]
    async fn unresolvable_layer_fails_export() {
        let mut s = session();
        s.set_base(ImageSource::from_image(RgbaImage::new(2, 2)), None);
        let id = s.add_image(ImageContent::remote("https://elsewhere.example/a.png"));
        match s.export(&pipeline()).await {
            Err(Error::Export(ExportError::Decode { layer, .. })) => assert_eq!(layer, Some(id)),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
