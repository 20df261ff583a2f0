//! Serializable session profile and the placement summary handed to checkout.
//!
//! A [`SessionProfile`] captures every layer's placement and content
//! reference in a JSON format the host can persist and restore later.
//! Image pixels are never embedded: image layers carry the opaque `asset`
//! reference they were created with and come back as remote sources.
//!
//! # Example
//!
//! ```
//! use mockup_renderer::{LayerKind, LayerProfile, PlacementProfile, SessionProfile};
//!
//! let profile = SessionProfile::new()
//!     .with_view("front")
//!     .with_layer(LayerProfile::image(
//!         "logo",
//!         "uploads/logo.png",
//!         PlacementProfile { top_pct: 30.0, left_pct: 50.0, width_pct: 40.0, height_pct: 20.0, rotate_deg: 0.0 },
//!     ));
//!
//! let json = profile.to_json().unwrap();
//! let restored = SessionProfile::from_json(&json).unwrap();
//! assert_eq!(restored.layers[0].kind, LayerKind::Image);
//! ```

use serde::{Deserialize, Serialize};

use crate::geometry::PercentRect;
use crate::layer::{LayerId, LayerKind};
use crate::placement::PlacementState;
use crate::text::TextObject;

// ============================================================================
// Placement
// ============================================================================

/// Percent placement of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PlacementProfile {
    pub top_pct: f64,
    pub left_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
    #[serde(default)]
    pub rotate_deg: f64,
}

impl PlacementProfile {
    pub fn percent_rect(&self) -> PercentRect {
        PercentRect::new(self.top_pct, self.left_pct, self.width_pct, self.height_pct)
    }
}

impl From<&PlacementState> for PlacementProfile {
    fn from(state: &PlacementState) -> Self {
        Self {
            top_pct: state.top_pct(),
            left_pct: state.left_pct(),
            width_pct: state.width_pct(),
            height_pct: state.height_pct(),
            rotate_deg: state.rotate_deg(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_zoom() -> f64 {
    1.0
}

// ============================================================================
// LayerProfile
// ============================================================================

/// One layer of a [`SessionProfile`].
///
/// Image layers set `asset`; text layers set `text`.
///
/// ```json
/// { "id": "logo", "kind": "image", "asset": "uploads/logo.png",
///   "topPct": 30.0, "leftPct": 50.0, "widthPct": 40.0, "heightPct": 20.0, "rotateDeg": 0.0 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct LayerProfile {
    pub id: LayerId,
    pub kind: LayerKind,

    #[serde(flatten)]
    pub placement: PlacementProfile,

    #[serde(default = "default_true")]
    pub visible: bool,

    #[serde(default)]
    pub locked: bool,

    /// Opaque image reference, resolved through the host's fetcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextObject>,
}

impl LayerProfile {
    pub fn image(id: impl Into<LayerId>, asset: impl Into<String>, placement: PlacementProfile) -> Self {
        Self {
            id: id.into(),
            kind: LayerKind::Image,
            placement,
            visible: true,
            locked: false,
            asset: Some(asset.into()),
            text: None,
        }
    }

    pub fn text(text: TextObject, placement: PlacementProfile) -> Self {
        Self {
            id: text.id.clone(),
            kind: LayerKind::Text,
            placement,
            visible: true,
            locked: false,
            asset: None,
            text: Some(text),
        }
    }
}

// ============================================================================
// SessionProfile
// ============================================================================

/// Everything needed to restore a design session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct SessionProfile {
    /// Garment view, e.g. `front`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,

    /// Garment color as chosen by the storefront.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    /// Reference of the base garment image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,

    #[serde(default = "default_zoom")]
    pub zoom: f64,

    /// Layers in paint order, bottom first.
    #[serde(default)]
    pub layers: Vec<LayerProfile>,
}

impl Default for SessionProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProfile {
    pub fn new() -> Self {
        Self {
            view: None,
            color: None,
            base: None,
            zoom: default_zoom(),
            layers: Vec::new(),
        }
    }

    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_layer(mut self, layer: LayerProfile) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// JSON Schema of the profile format, for hosts that validate saved
    /// designs before loading them.
    #[cfg(feature = "jsonschema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(SessionProfile)
    }
}

// ============================================================================
// PlacementSummary
// ============================================================================

/// Where one layer ended up, as reported to checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct LayerSummary {
    pub id: LayerId,
    pub kind: LayerKind,
    #[serde(flatten)]
    pub placement: PlacementProfile,
}

/// Per-layer placement plus the garment view and color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PlacementSummary {
    pub view: Option<String>,
    pub color: Option<String>,
    pub layers: Vec<LayerSummary>,
}

impl PlacementSummary {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn placement() -> PlacementProfile {
        PlacementProfile {
            top_pct: 25.0,
            left_pct: 40.0,
            width_pct: 30.0,
            height_pct: 15.0,
            rotate_deg: -12.5,
        }
    }

    #[test]
    fn profile_serialization_roundtrip() {
        let text = TextObject::new(LayerId::from("t1"), "Team 2026");
        let profile = SessionProfile::new()
            .with_view("back")
            .with_color("navy")
            .with_base("garments/tee-back.png")
            .with_layer(LayerProfile::image("img-1", "uploads/a.png", placement()))
            .with_layer(LayerProfile::text(text.clone(), placement()));

        let json = profile.to_json().unwrap();
        let restored = SessionProfile::from_json(&json).unwrap();

        assert_eq!(restored, profile);
        assert_eq!(restored.layers[1].text.as_ref(), Some(&text));
        assert_eq!(restored.layers[0].placement.rotate_deg, -12.5);
    }

    #[test]
    fn profile_json_format() {
        let profile =
            SessionProfile::new().with_layer(LayerProfile::image("img", "a.png", placement()));
        let json = profile.to_json_pretty().unwrap();

        // Placement is flattened into the layer object.
        assert!(json.contains("\"topPct\""));
        assert!(json.contains("\"rotateDeg\""));
        assert!(json.contains("\"kind\": \"image\""));
        assert!(!json.contains("\"text\""));
        assert!(!json.contains("\"view\""));
    }

    #[test]
    fn empty_profile_deserializes() {
        let profile = SessionProfile::from_json("{}").unwrap();
        assert!(profile.layers.is_empty());
        assert_eq!(profile.zoom, 1.0);
        assert!(profile.view.is_none());
    }

    #[test]
    fn default_matches_new_and_serde() {
        assert_eq!(SessionProfile::default().zoom, 1.0);
        assert_eq!(SessionProfile::default(), SessionProfile::new());
        assert_eq!(SessionProfile::default(), SessionProfile::from_json("{}").unwrap());
    }

    #[test]
    fn layer_defaults() {
        let json = r#"{"id":"x","kind":"image","asset":"a.png","topPct":1,"leftPct":2,"widthPct":30,"heightPct":40}"#;
        let layer: LayerProfile = serde_json::from_str(json).unwrap();
        assert!(layer.visible);
        assert!(!layer.locked);
        assert_eq!(layer.placement.rotate_deg, 0.0);
    }

    #[test]
    fn summary_format() {
        let summary = PlacementSummary {
            view: Some("front".into()),
            color: None,
            layers: vec![LayerSummary {
                id: LayerId::from("img"),
                kind: LayerKind::Image,
                placement: placement(),
            }],
        };
        let json = summary.to_json().unwrap();
        assert!(json.contains(r#""view":"front""#));
        assert!(json.contains(r#""widthPct":30.0"#));
    }

    #[cfg(feature = "jsonschema")]
    #[test]
    fn schema_names_layer_fields() {
        let schema = serde_json::to_string(&SessionProfile::json_schema()).unwrap();
        assert!(schema.contains("layers"));
        assert!(schema.contains("topPct"));
    }
}
