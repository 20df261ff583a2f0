//! Styled text layers.
//!
//! A [`TextObject`] describes a piece of text and its styling. It is turned
//! into SVG markup by [`markup`], which both the preview and the export
//! pipeline rasterize, and it is edited through [`TextLayerStore`], which
//! keeps an undo history.

pub mod markup;
pub mod store;

pub use store::TextLayerStore;

use std::str::FromStr;

use palette::Srgb;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::layer::LayerId;

// ============================================================================
// Style Types
// ============================================================================

/// One color stop of a gradient fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct GradientStop {
    /// Position along the gradient, 0.0-1.0.
    pub offset: f64,
    pub color: String,
}

/// How the glyphs are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum TextFill {
    Solid { value: String },
    #[serde(rename_all = "camelCase")]
    Gradient {
        angle_deg: f64,
        stops: Vec<GradientStop>,
    },
}

impl TextFill {
    pub fn solid(color: impl Into<String>) -> Self {
        Self::Solid {
            value: color.into(),
        }
    }
}

/// Stroke corner style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum LineJoin {
    Miter,
    #[default]
    Round,
    Bevel,
}

impl LineJoin {
    pub fn as_svg(self) -> &'static str {
        match self {
            Self::Miter => "miter",
            Self::Round => "round",
            Self::Bevel => "bevel",
        }
    }
}

/// Glyph outline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct Outline {
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub join: LineJoin,
}

/// Drop shadow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct Shadow {
    pub dx: f64,
    pub dy: f64,
    pub blur: f64,
    /// 0.0-1.0.
    pub opacity: f64,
    #[serde(default = "default_shadow_color")]
    pub color: String,
}

fn default_shadow_color() -> String {
    "#000000".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum CaseTransform {
    #[default]
    Normal,
    Upper,
    Lower,
    SmallCaps,
}

/// Baseline shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum TextPath {
    /// Straight baseline.
    #[default]
    None,
    /// Semicircular baseline. With `invert` the text runs along the lower
    /// half of the circle instead of the upper one.
    Arc {
        radius: f64,
        #[serde(default)]
        invert: bool,
    },
}

/// Placement of a text object rendered as a standalone vector layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TextTransform {
    /// Center of the text in print-area pixels.
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotate_deg: f64,
}

impl Default for TextTransform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotate_deg: 0.0,
        }
    }
}

// ============================================================================
// TextObject
// ============================================================================

/// A styled piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct TextObject {
    pub id: LayerId,
    pub text: String,
    pub font_family: String,
    pub size_px: f64,
    pub color: TextFill,
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub shadow: Option<Shadow>,
    #[serde(default)]
    pub align: TextAlign,
    /// Extra space between letters, in pixels.
    #[serde(default)]
    pub tracking: f64,
    /// Line height as a multiple of the font size.
    #[serde(default = "default_leading")]
    pub leading: f64,
    #[serde(default)]
    pub case_transform: CaseTransform,
    #[serde(default)]
    pub path: TextPath,
    #[serde(default)]
    pub transform: TextTransform,
    #[serde(default = "default_true")]
    pub visible: bool,
}

fn default_leading() -> f64 {
    1.2
}

fn default_true() -> bool {
    true
}

impl TextObject {
    /// A black, centered, 32px Arial text object at the origin.
    pub fn new(id: LayerId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            font_family: "Arial".to_string(),
            size_px: 32.0,
            color: TextFill::solid("#000000"),
            outline: None,
            shadow: None,
            align: TextAlign::Center,
            tracking: 0.0,
            leading: default_leading(),
            case_transform: CaseTransform::Normal,
            path: TextPath::None,
            transform: TextTransform::default(),
            visible: true,
        }
    }

    /// The text after applying the case transform.
    ///
    /// Small caps are rendered by the font, so the string is left as-is.
    pub fn display_text(&self) -> String {
        match self.case_transform {
            CaseTransform::Upper => self.text.to_uppercase(),
            CaseTransform::Lower => self.text.to_lowercase(),
            CaseTransform::Normal | CaseTransform::SmallCaps => self.text.clone(),
        }
    }

    /// Checks every field and normalizes colors to `#rrggbb`.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if self.font_family.trim().is_empty() {
            return Err(ValidationError::InvalidStyle(
                "font family must not be empty".into(),
            ));
        }
        require_positive("sizePx", self.size_px)?;
        require_positive("leading", self.leading)?;
        require_finite("tracking", self.tracking)?;

        self.color = match self.color {
            TextFill::Solid { value } => TextFill::Solid {
                value: normalize_color(&value)?,
            },
            TextFill::Gradient { angle_deg, stops } => {
                require_finite("angleDeg", angle_deg)?;
                if stops.len() < 2 {
                    return Err(ValidationError::InvalidStyle(
                        "a gradient needs at least two stops".into(),
                    ));
                }
                let stops = stops
                    .into_iter()
                    .map(|stop| {
                        require_finite("offset", stop.offset)?;
                        Ok(GradientStop {
                            offset: stop.offset.clamp(0.0, 1.0),
                            color: normalize_color(&stop.color)?,
                        })
                    })
                    .collect::<Result<Vec<_>, ValidationError>>()?;
                TextFill::Gradient { angle_deg, stops }
            }
        };

        if let Some(outline) = self.outline.as_mut() {
            require_finite("outline.width", outline.width)?;
            if outline.width < 0.0 {
                return Err(ValidationError::InvalidStyle(
                    "outline width must not be negative".into(),
                ));
            }
            outline.color = normalize_color(&outline.color)?;
        }

        if let Some(shadow) = self.shadow.as_mut() {
            require_finite("shadow.dx", shadow.dx)?;
            require_finite("shadow.dy", shadow.dy)?;
            require_finite("shadow.blur", shadow.blur)?;
            require_finite("shadow.opacity", shadow.opacity)?;
            shadow.blur = shadow.blur.max(0.0);
            shadow.opacity = shadow.opacity.clamp(0.0, 1.0);
            shadow.color = normalize_color(&shadow.color)?;
        }

        if let TextPath::Arc { radius, .. } = self.path {
            if !radius.is_finite() || radius <= 0.0 {
                return Err(ValidationError::DegenerateArc(radius));
            }
        }

        require_finite("transform.x", self.transform.x)?;
        require_finite("transform.y", self.transform.y)?;
        require_finite("transform.rotateDeg", self.transform.rotate_deg)?;
        require_positive("transform.scale", self.transform.scale)?;

        Ok(self)
    }

    /// Applies the set fields of a patch.
    pub fn apply(&mut self, patch: TextPatch) {
        let TextPatch {
            text,
            font_family,
            size_px,
            color,
            outline,
            shadow,
            align,
            tracking,
            leading,
            case_transform,
            path,
            transform,
            visible,
        } = patch;
        if let Some(v) = text {
            self.text = v;
        }
        if let Some(v) = font_family {
            self.font_family = v;
        }
        if let Some(v) = size_px {
            self.size_px = v;
        }
        if let Some(v) = color {
            self.color = v;
        }
        if let Some(v) = outline {
            self.outline = v;
        }
        if let Some(v) = shadow {
            self.shadow = v;
        }
        if let Some(v) = align {
            self.align = v;
        }
        if let Some(v) = tracking {
            self.tracking = v;
        }
        if let Some(v) = leading {
            self.leading = v;
        }
        if let Some(v) = case_transform {
            self.case_transform = v;
        }
        if let Some(v) = path {
            self.path = v;
        }
        if let Some(v) = transform {
            self.transform = v;
        }
        if let Some(v) = visible {
            self.visible = v;
        }
    }
}

/// A partial update of a [`TextObject`]. `None` fields are left alone;
/// `Some(None)` clears an optional style.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextPatch {
    pub text: Option<String>,
    pub font_family: Option<String>,
    pub size_px: Option<f64>,
    pub color: Option<TextFill>,
    pub outline: Option<Option<Outline>>,
    pub shadow: Option<Option<Shadow>>,
    pub align: Option<TextAlign>,
    pub tracking: Option<f64>,
    pub leading: Option<f64>,
    pub case_transform: Option<CaseTransform>,
    pub path: Option<TextPath>,
    pub transform: Option<TextTransform>,
    pub visible: Option<bool>,
}

impl TextPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn path(path: TextPath) -> Self {
        Self {
            path: Some(path),
            ..Self::default()
        }
    }
}

// ============================================================================
// Color Utilities
// ============================================================================

/// Parses `#rgb` / `#rrggbb` and returns lowercase `#rrggbb`.
pub fn normalize_color(color: &str) -> Result<String, ValidationError> {
    let parsed: Srgb<u8> = Srgb::from_str(color.trim())
        .map_err(|_| ValidationError::InvalidColor(color.to_string()))?;
    Ok(format!(
        "#{:02x}{:02x}{:02x}",
        parsed.red, parsed.green, parsed.blue
    ))
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field })
    }
}

fn require_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    require_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidStyle(format!(
            "{field} must be positive, got {value}"
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TextObject {
        TextObject::new(LayerId::from("t1"), "Hello")
    }

    #[test]
    fn normalize_color_forms() {
        assert_eq!(normalize_color("#FFF").unwrap(), "#ffffff");
        assert_eq!(normalize_color(" #12AbEf ").unwrap(), "#12abef");
        assert!(matches!(
            normalize_color("tomato"),
            Err(ValidationError::InvalidColor(_))
        ));
    }

    #[test]
    fn case_transform() {
        let mut text = sample();
        text.case_transform = CaseTransform::Upper;
        assert_eq!(text.display_text(), "HELLO");
        text.case_transform = CaseTransform::Lower;
        assert_eq!(text.display_text(), "hello");
        text.case_transform = CaseTransform::SmallCaps;
        assert_eq!(text.display_text(), "Hello");
    }

    #[test]
    fn validated_normalizes_colors() {
        let mut text = sample();
        text.color = TextFill::solid("#F00");
        text.outline = Some(Outline {
            color: "#0F0".into(),
            width: 2.0,
            join: LineJoin::Miter,
        });
        text.shadow = Some(Shadow {
            dx: 1.0,
            dy: 1.0,
            blur: -3.0,
            opacity: 4.0,
            color: "#000".into(),
        });
        let text = text.validated().unwrap();
        assert_eq!(text.color, TextFill::solid("#ff0000"));
        assert_eq!(text.outline.unwrap().color, "#00ff00");
        let shadow = text.shadow.unwrap();
        assert_eq!(shadow.blur, 0.0);
        assert_eq!(shadow.opacity, 1.0);
    }

    #[test]
    fn zero_radius_arc_is_rejected() {
        let mut text = sample();
        text.path = TextPath::Arc {
            radius: 0.0,
            invert: false,
        };
        assert_eq!(
            text.validated().unwrap_err(),
            ValidationError::DegenerateArc(0.0)
        );
    }

    #[test]
    fn bad_style_is_rejected() {
        let mut text = sample();
        text.size_px = 0.0;
        assert!(text.validated().is_err());

        let mut text = sample();
        text.font_family = "  ".into();
        assert!(text.validated().is_err());

        let mut text = sample();
        text.color = TextFill::Gradient {
            angle_deg: 0.0,
            stops: vec![GradientStop {
                offset: 0.0,
                color: "#fff".into(),
            }],
        };
        assert!(text.validated().is_err());
    }

    #[test]
    fn patch_clears_optional_styles() {
        let mut text = sample();
        text.outline = Some(Outline {
            color: "#000".into(),
            width: 1.0,
            join: LineJoin::Round,
        });
        text.apply(TextPatch {
            outline: Some(None),
            tracking: Some(2.5),
            ..TextPatch::default()
        });
        assert!(text.outline.is_none());
        assert_eq!(text.tracking, 2.5);
        assert_eq!(text.text, "Hello");
    }

    #[test]
    fn json_shape() {
        let mut text = sample();
        text.path = TextPath::Arc {
            radius: 120.0,
            invert: true,
        };
        let json = serde_json::to_string(&text).unwrap();
        assert!(json.contains(r#""fontFamily":"Arial""#));
        assert!(json.contains(r#""mode":"solid""#));
        assert!(json.contains(r#""type":"arc""#));

        let back: TextObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, text);
    }
}
