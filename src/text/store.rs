//! Ordered collection of text objects with snapshot undo/redo.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::markup;
use super::{TextFill, TextObject, TextPatch, TextTransform, normalize_color};
use crate::compositor::encode_png;
use crate::config::{BestFit, EngineConfig, TextSettings};
use crate::error::{Result, ValidationError};
use crate::geometry::SurfaceSize;
use crate::layer::svg::rasterize_svg;
use crate::layer::{FontLibrary, LayerId};

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    objects: Vec<TextObject>,
    selected: Option<LayerId>,
}

/// Serialized form used by [`TextLayerStore::export_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TextDocument {
    pub objects: Vec<TextObject>,
    #[serde(default)]
    pub selected_id: Option<LayerId>,
    /// Font families referenced by the objects, sorted.
    #[serde(default)]
    pub fonts: Vec<String>,
}

/// Text objects in paint order, the current selection and an undo history.
#[derive(Debug)]
pub struct TextLayerStore {
    objects: Vec<TextObject>,
    selected: Option<LayerId>,
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    settings: TextSettings,
    best_fit: BestFit,
    print_area: SurfaceSize,
    fonts: FontLibrary,
    next_id: u64,
}

impl TextLayerStore {
    pub fn new(
        settings: TextSettings,
        best_fit: BestFit,
        print_area: SurfaceSize,
        fonts: FontLibrary,
    ) -> Self {
        Self {
            objects: Vec::new(),
            selected: None,
            undo: VecDeque::new(),
            redo: Vec::new(),
            settings,
            best_fit,
            print_area,
            fonts,
            next_id: 1,
        }
    }

    pub fn from_config(config: &EngineConfig, fonts: FontLibrary) -> Self {
        Self::new(
            config.text.clone(),
            config.best_fit,
            config.print_area,
            fonts,
        )
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Objects in paint order, bottom first.
    pub fn objects(&self) -> &[TextObject] {
        &self.objects
    }

    pub fn get(&self, id: &LayerId) -> Option<&TextObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    pub fn selected(&self) -> Option<&LayerId> {
        self.selected.as_ref()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn index_of(&self, id: &LayerId) -> Result<usize, ValidationError> {
        self.objects
            .iter()
            .position(|o| &o.id == id)
            .ok_or_else(|| ValidationError::UnknownLayer(id.clone()))
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Creates a text object centered in the best-fit window and selects it.
    pub fn create(&mut self, initial_text: &str) -> Result<&TextObject, ValidationError> {
        let id = self.fresh_id();
        let settings = &self.settings;
        let best_fit = &self.best_fit;

        let box_height = best_fit.height_pct / 100.0 * self.print_area.height;
        let size_px = (box_height * settings.font_height_ratio)
            .clamp(settings.min_font_px, settings.max_font_px);

        let mut text = TextObject::new(id.clone(), initial_text);
        text.font_family = settings.font_family.clone();
        text.color = TextFill::solid(normalize_color(&settings.color)?);
        text.size_px = size_px;
        text.transform = TextTransform {
            x: best_fit.left_pct / 100.0 * self.print_area.width,
            y: (best_fit.top_pct + best_fit.height_pct / 2.0) / 100.0 * self.print_area.height,
            scale: 1.0,
            rotate_deg: best_fit.rotate_deg,
        };
        let text = text.validated()?;

        self.checkpoint();
        self.objects.push(text);
        self.selected = Some(id);
        self.next_id += 1;
        tracing::debug!("created text object, {} total", self.objects.len());
        Ok(&self.objects[self.objects.len() - 1])
    }

    /// Applies a patch. Invalid results leave the object untouched.
    pub fn update(&mut self, id: &LayerId, patch: TextPatch) -> Result<&TextObject, ValidationError> {
        let index = self.index_of(id)?;
        let mut updated = self.objects[index].clone();
        updated.apply(patch);
        let updated = updated.validated()?;

        self.checkpoint();
        self.objects[index] = updated;
        Ok(&self.objects[index])
    }

    pub fn delete(&mut self, id: &LayerId) -> Result<TextObject, ValidationError> {
        let index = self.index_of(id)?;
        self.checkpoint();
        let removed = self.objects.remove(index);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        Ok(removed)
    }

    /// Clones an object under a new id, offset down and to the right, and
    /// selects the copy. The copy is placed directly above the original.
    pub fn duplicate(&mut self, id: &LayerId) -> Result<&TextObject, ValidationError> {
        let index = self.index_of(id)?;
        let new_id = self.fresh_id();
        let offset = self.settings.duplicate_offset_px;

        let mut copy = self.objects[index].clone();
        copy.id = new_id.clone();
        copy.transform.x += offset;
        copy.transform.y += offset;

        self.checkpoint();
        self.objects.insert(index + 1, copy);
        self.selected = Some(new_id);
        self.next_id += 1;
        Ok(&self.objects[index + 1])
    }

    /// Moves an object to `new_index`, clamped to the list.
    pub fn reorder(&mut self, id: &LayerId, new_index: usize) -> Result<(), ValidationError> {
        let index = self.index_of(id)?;
        let target = new_index.min(self.objects.len() - 1);
        if index == target {
            return Ok(());
        }
        self.checkpoint();
        let object = self.objects.remove(index);
        self.objects.insert(target, object);
        Ok(())
    }

    /// Changes the selection. Not recorded in the undo history.
    pub fn select(&mut self, id: Option<&LayerId>) -> Result<(), ValidationError> {
        if let Some(id) = id {
            self.index_of(id)?;
        }
        self.selected = id.cloned();
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop_back() else {
            return false;
        };
        let current = self.snapshot();
        self.redo.push(current);
        self.restore(previous);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        let current = self.snapshot();
        self.undo.push_back(current);
        self.restore(next);
        true
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            objects: self.objects.clone(),
            selected: self.selected.clone(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.objects = snapshot.objects;
        self.selected = snapshot.selected;
    }

    /// Records the current state before a mutation.
    fn checkpoint(&mut self) {
        if self.settings.undo_depth == 0 {
            self.redo.clear();
            return;
        }
        let snapshot = self.snapshot();
        self.undo.push_back(snapshot);
        while self.undo.len() > self.settings.undo_depth {
            self.undo.pop_front();
        }
        self.redo.clear();
    }

    fn fresh_id(&self) -> LayerId {
        let mut n = self.next_id;
        loop {
            let id = LayerId::new(format!("text-{n}"));
            if self.get(&id).is_none() {
                return id;
            }
            n += 1;
        }
    }

    // ------------------------------------------------------------------
    // Export / Import
    // ------------------------------------------------------------------

    /// SVG of every visible object on the print area.
    pub fn export_vector(&self) -> String {
        markup::document(&self.objects, self.print_area)
    }

    pub fn export_json(&self) -> Result<String> {
        let fonts: BTreeSet<String> = self
            .objects
            .iter()
            .map(|o| o.font_family.clone())
            .collect();
        let document = TextDocument {
            objects: self.objects.clone(),
            selected_id: self.selected.clone(),
            fonts: fonts.into_iter().collect(),
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Replaces the store's content from JSON produced by
    /// [`export_json`](Self::export_json). On error the store is unchanged.
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let document: TextDocument = serde_json::from_str(json)?;
        self.replace(document.objects, document.selected_id)?;
        tracing::debug!("imported {} text objects", self.objects.len());
        Ok(())
    }

    /// Replaces every object as one undoable step. Validates everything
    /// first; on error the store is unchanged.
    pub fn replace(
        &mut self,
        objects: Vec<TextObject>,
        selected: Option<LayerId>,
    ) -> Result<(), ValidationError> {
        let (validated, seen) = validate_all(objects)?;
        let selected = selected.filter(|id| seen.contains(id));

        self.checkpoint();
        self.objects = validated;
        self.selected = selected;
        Ok(())
    }

    /// Loads a new document: replaces every object, clears the selection
    /// and drops both history stacks, so nothing from before the load can
    /// be undone back in. On error the store is unchanged.
    pub fn reset(&mut self, objects: Vec<TextObject>) -> Result<(), ValidationError> {
        let (validated, _) = validate_all(objects)?;
        self.objects = validated;
        self.selected = None;
        self.undo.clear();
        self.redo.clear();
        Ok(())
    }

    /// PNG of [`export_vector`](Self::export_vector) at `width x height`.
    pub fn export_raster(&self, width: u32, height: u32) -> Result<Vec<u8>> {
        let svg = self.export_vector();
        let pixmap = rasterize_svg(svg.as_bytes(), width, height, &self.fonts)?;
        Ok(encode_png(&pixmap)?)
    }
}

/// Validates each object and rejects duplicate ids.
fn validate_all(
    objects: Vec<TextObject>,
) -> Result<(Vec<TextObject>, BTreeSet<LayerId>), ValidationError> {
    let mut seen = BTreeSet::new();
    let mut validated = Vec::with_capacity(objects.len());
    for object in objects {
        if !seen.insert(object.id.clone()) {
            return Err(ValidationError::InvalidStyle(format!(
                "duplicate text id {}",
                object.id
            )));
        }
        validated.push(object.validated()?);
    }
    Ok((validated, seen))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::TextPath;

    fn store() -> TextLayerStore {
        TextLayerStore::from_config(&EngineConfig::default(), FontLibrary::empty())
    }

    #[test]
    fn create_lands_in_best_fit_window() {
        let mut store = store();
        let sale = store.create("SALE").unwrap().clone();

        // Best fit on 400x500: x in [120, 280], y in [150, 250].
        assert_eq!(sale.transform.x, 200.0);
        assert_eq!(sale.transform.y, 200.0);
        assert!((120.0..=280.0).contains(&sale.transform.x));
        assert!((150.0..=250.0).contains(&sale.transform.y));
        // 20% of 500 * 0.4
        assert_eq!(sale.size_px, 40.0);
        assert_eq!(store.selected(), Some(&sale.id));
    }

    #[test]
    fn font_size_is_clamped() {
        let mut config = EngineConfig::default();
        config.print_area = SurfaceSize::new(100.0, 100.0);
        let mut small = TextLayerStore::from_config(&config, FontLibrary::empty());
        assert_eq!(small.create("a").unwrap().size_px, 24.0);

        config.print_area = SurfaceSize::new(4000.0, 4000.0);
        let mut large = TextLayerStore::from_config(&config, FontLibrary::empty());
        assert_eq!(large.create("a").unwrap().size_px, 72.0);
    }

    #[test]
    fn zero_radius_update_is_rejected_without_change() {
        let mut store = store();
        let id = store.create("ARC").unwrap().id.clone();
        let before = store.get(&id).unwrap().clone();

        let err = store
            .update(
                &id,
                TextPatch::path(TextPath::Arc {
                    radius: 0.0,
                    invert: false,
                }),
            )
            .unwrap_err();
        assert_eq!(err, ValidationError::DegenerateArc(0.0));
        assert_eq!(store.get(&id).unwrap(), &before);
        assert!(store.undo());
        assert!(store.is_empty());
    }

    #[test]
    fn undo_redo_restores_snapshots() {
        let mut store = store();
        let id = store.create("one").unwrap().id.clone();
        store.update(&id, TextPatch::text("two")).unwrap();
        store.update(&id, TextPatch::text("three")).unwrap();

        assert!(store.undo());
        assert_eq!(store.get(&id).unwrap().text, "two");
        assert!(store.undo());
        assert_eq!(store.get(&id).unwrap().text, "one");
        assert!(store.redo());
        assert_eq!(store.get(&id).unwrap().text, "two");

        // A new edit drops the redo branch.
        store.update(&id, TextPatch::text("four")).unwrap();
        assert!(!store.can_redo());
        assert!(!store.redo());
    }

    #[test]
    fn undo_depth_is_bounded() {
        let mut config = EngineConfig::default();
        config.text.undo_depth = 3;
        let mut store = TextLayerStore::from_config(&config, FontLibrary::empty());
        let id = store.create("0").unwrap().id.clone();
        for i in 1..10 {
            store.update(&id, TextPatch::text(i.to_string())).unwrap();
        }
        let mut undone = 0;
        while store.undo() {
            undone += 1;
        }
        assert_eq!(undone, 3);
        assert_eq!(store.get(&id).unwrap().text, "6");
    }

    #[test]
    fn duplicate_offsets_and_selects_copy() {
        let mut store = store();
        let id = store.create("dup").unwrap().id.clone();
        let original = store.get(&id).unwrap().clone();
        let copy = store.duplicate(&id).unwrap().clone();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.transform.x, original.transform.x + 20.0);
        assert_eq!(copy.transform.y, original.transform.y + 20.0);
        assert_eq!(copy.text, original.text);
        assert_eq!(store.selected(), Some(&copy.id));
        assert_eq!(store.objects()[1].id, copy.id);
    }

    #[test]
    fn delete_and_reorder() {
        let mut store = store();
        let a = store.create("a").unwrap().id.clone();
        let b = store.create("b").unwrap().id.clone();
        let c = store.create("c").unwrap().id.clone();

        store.reorder(&c, 0).unwrap();
        let order: Vec<_> = store.objects().iter().map(|o| o.id.clone()).collect();
        assert_eq!(order, vec![c.clone(), a.clone(), b.clone()]);

        store.reorder(&c, 99).unwrap();
        assert_eq!(store.objects()[2].id, c);

        store.delete(&c).unwrap();
        assert_eq!(store.selected(), None);
        assert_eq!(store.len(), 2);
        assert!(matches!(
            store.delete(&c),
            Err(ValidationError::UnknownLayer(_))
        ));
    }

    #[test]
    fn reset_drops_history() {
        let mut store = store();
        let id = store.create("old").unwrap().id.clone();
        store.update(&id, TextPatch::text("older")).unwrap();
        store.undo();
        assert!(store.can_undo() && store.can_redo());

        store
            .reset(vec![TextObject::new(LayerId::from("loaded"), "new")])
            .unwrap();
        assert!(!store.can_undo());
        assert!(!store.can_redo());
        assert!(!store.undo());
        assert_eq!(store.len(), 1);
        assert_eq!(store.selected(), None);

        let dupes = vec![
            TextObject::new(LayerId::from("d"), "1"),
            TextObject::new(LayerId::from("d"), "2"),
        ];
        assert!(store.reset(dupes).is_err());
        assert_eq!(store.objects()[0].id, LayerId::from("loaded"));
    }

    #[test]
    fn select_is_not_undoable() {
        let mut store = store();
        let a = store.create("a").unwrap().id.clone();
        store.select(None).unwrap();
        assert!(store.undo());
        assert!(store.is_empty());
        assert!(store.select(Some(&a)).is_err());
    }

    #[test]
    fn json_round_trip_lists_fonts() {
        let mut store = store();
        let id = store.create("x").unwrap().id.clone();
        store
            .update(
                &id,
                TextPatch {
                    font_family: Some("Impact".into()),
                    ..TextPatch::default()
                },
            )
            .unwrap();
        store.create("y").unwrap();

        let json = store.export_json().unwrap();
        assert!(json.contains(r#""fonts":["Arial","Impact"]"#));

        let mut other = TextLayerStore::from_config(&EngineConfig::default(), FontLibrary::empty());
        other.import_json(&json).unwrap();
        assert_eq!(other.objects(), store.objects());
        assert_eq!(other.selected(), store.selected());

        // New ids do not collide with imported ones.
        let fresh = other.create("z").unwrap().id.clone();
        assert!(store.get(&fresh).is_none());
    }

    #[test]
    fn invalid_import_leaves_store_unchanged() {
        let mut store = store();
        store.create("keep").unwrap();
        let before = store.objects().to_vec();

        let mut bad = TextObject::new(LayerId::from("bad"), "x");
        bad.path = TextPath::Arc {
            radius: -1.0,
            invert: false,
        };
        let json = serde_json::to_string(&TextDocument {
            objects: vec![bad],
            selected_id: None,
            fonts: vec![],
        })
        .unwrap();
        assert!(store.import_json(&json).is_err());
        assert!(store.import_json("{not json").is_err());
        assert_eq!(store.objects(), before.as_slice());
    }

    #[test]
    fn vector_and_raster_export() {
        let mut store = store();
        store.create("SALE").unwrap();
        let svg = store.export_vector();
        assert!(svg.contains("SALE"));
        assert!(svg.contains(r#"viewBox="0 0 400 500""#));

        let png = store.export_raster(80, 100).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
