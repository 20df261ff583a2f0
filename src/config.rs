//! Engine configuration.
//!
//! All tunables live in [`EngineConfig`], which deserializes from JSON with
//! every field optional:
//!
//! ```
//! use mockup_renderer::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "limits": { "maxSizePct": 80 } }"#).unwrap();
//! assert_eq!(config.limits.max_size_pct, 80.0);
//! assert_eq!(config.limits.min_size_pct, 10.0);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::geometry::{PercentRect, SurfaceSize};

/// Clamping ranges and pointer sensitivities for a placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PlacementLimits {
    pub min_size_pct: f64,
    pub max_size_pct: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Multiplier applied to percent deltas while dragging.
    pub drag_sensitivity: f64,
    /// Multiplier applied to percent deltas while resizing.
    pub resize_sensitivity: f64,
}

impl Default for PlacementLimits {
    fn default() -> Self {
        Self {
            min_size_pct: 10.0,
            max_size_pct: 90.0,
            min_zoom: 0.2,
            max_zoom: 3.0,
            drag_sensitivity: 1.0,
            resize_sensitivity: 0.5,
        }
    }
}

/// The designer-chosen default placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct BestFit {
    pub top_pct: f64,
    pub left_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
    pub rotate_deg: f64,
}

impl Default for BestFit {
    fn default() -> Self {
        Self {
            top_pct: 30.0,
            left_pct: 50.0,
            width_pct: 40.0,
            height_pct: 20.0,
            rotate_deg: 0.0,
        }
    }
}

impl BestFit {
    pub fn percent_rect(&self) -> PercentRect {
        PercentRect::new(self.top_pct, self.left_pct, self.width_pct, self.height_pct)
    }
}

/// Keyboard step sizes and snapping behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct InteractionSettings {
    /// Arrow-key nudge in percent.
    pub nudge_step_pct: f64,
    /// Nudge with Shift held.
    pub nudge_coarse_pct: f64,
    /// Nudge with Alt held.
    pub nudge_fine_pct: f64,
    /// `+`/`-` size change in percent.
    pub resize_step_pct: f64,
    /// `[`/`]` rotation in degrees.
    pub rotate_step_deg: f64,
    /// Distance from the vertical center line at which dragging snaps to it.
    /// Zero disables snapping.
    pub snap_threshold_pct: f64,
    /// Angle increment used when rotation snapping is requested.
    pub rotation_snap_deg: f64,
    /// Pointer radius around a handle that still counts as a hit.
    pub handle_radius_px: f64,
    /// Distance above the top edge of the rotate handle.
    pub rotate_handle_offset_px: f64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            nudge_step_pct: 1.0,
            nudge_coarse_pct: 5.0,
            nudge_fine_pct: 0.5,
            resize_step_pct: 2.0,
            rotate_step_deg: 5.0,
            snap_threshold_pct: 1.0,
            rotation_snap_deg: 15.0,
            handle_radius_px: 8.0,
            rotate_handle_offset_px: 24.0,
        }
    }
}

/// Export target settings.
///
/// A pipeline carries its own copy; [`Session::export`](crate::Session::export)
/// sizes the composite from the pipeline's settings, not the session config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct ExportSettings {
    /// Logical size of the composite.
    pub target: SurfaceSize,
    /// Device pixel multiplier, clamped to `1.0..=max_dpi_scale`.
    pub dpi_scale: f64,
    pub max_dpi_scale: f64,
    /// Upper bound on the image-loading phase.
    pub timeout_ms: u64,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            target: SurfaceSize::new(2000.0, 2000.0),
            dpi_scale: 1.0,
            max_dpi_scale: 3.0,
            timeout_ms: 30_000,
        }
    }
}

impl ExportSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn clamped_dpi(&self, requested: f64) -> f64 {
        if requested.is_finite() {
            requested.clamp(1.0, self.max_dpi_scale.max(1.0))
        } else {
            1.0
        }
    }
}

/// Accepted upload types and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_types: [
                "image/png",
                "image/jpeg",
                "image/webp",
                "image/gif",
                "image/svg+xml",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Text subsystem defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TextSettings {
    pub font_family: String,
    pub color: String,
    pub min_font_px: f64,
    pub max_font_px: f64,
    /// Fraction of the best-fit box height used as the initial font size.
    pub font_height_ratio: f64,
    pub undo_depth: usize,
    pub duplicate_offset_px: f64,
    /// Load installed system fonts for text rasterization.
    pub load_system_fonts: bool,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            color: "#000000".to_string(),
            min_font_px: 24.0,
            max_font_px: 72.0,
            font_height_ratio: 0.4,
            undo_depth: 50,
            duplicate_offset_px: 20.0,
            load_system_fonts: true,
        }
    }
}

/// Top-level configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct EngineConfig {
    /// The printable region, in preview pixels at zoom 1.0.
    pub print_area: SurfaceSize,
    pub limits: PlacementLimits,
    pub best_fit: BestFit,
    pub interaction: InteractionSettings,
    pub export: ExportSettings,
    pub upload: UploadPolicy,
    pub text: TextSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            print_area: SurfaceSize::new(400.0, 500.0),
            limits: PlacementLimits::default(),
            best_fit: BestFit::default(),
            interaction: InteractionSettings::default(),
            export: ExportSettings::default(),
            upload: UploadPolicy::default(),
            text: TextSettings::default(),
        }
    }
}

/// Fails unless `min <= max` and both are finite and positive.
fn check_range(name: &str, min: f64, max: f64) -> Result<(), ValidationError> {
    let valid = min.is_finite() && max.is_finite() && min > 0.0 && min <= max;
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfig(format!(
            "{name} range [{min}, {max}] is empty or not positive"
        )))
    }
}

fn check_surface(name: &str, surface: SurfaceSize) -> Result<(), ValidationError> {
    if surface.is_degenerate() {
        return Err(ValidationError::InvalidConfig(format!(
            "{name} {}x{} is degenerate",
            surface.width, surface.height
        )));
    }
    Ok(())
}

impl EngineConfig {
    /// Parses and validates a config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every min/max pair and surface size. A config that passes
    /// never makes a clamp panic.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let limits = &self.limits;
        check_range("size", limits.min_size_pct, limits.max_size_pct)?;
        if limits.max_size_pct > 100.0 {
            return Err(ValidationError::InvalidConfig(format!(
                "max size {}% exceeds the print area",
                limits.max_size_pct
            )));
        }
        check_range("zoom", limits.min_zoom, limits.max_zoom)?;
        check_range("font size", self.text.min_font_px, self.text.max_font_px)?;
        check_surface("print area", self.print_area)?;
        check_surface("export target", self.export.target)?;
        if !self.export.max_dpi_scale.is_finite() {
            return Err(ValidationError::InvalidConfig(
                "max dpi scale must be finite".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
