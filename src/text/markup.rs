//! SVG markup for text objects.
//!
//! Every text object is laid out in a local frame centered on the origin.
//! [`standalone_svg`] fits that frame into a raster box for layer previews
//! and exports; [`document`] places several objects on the print area using
//! their own [`TextTransform`](super::TextTransform).

use std::fmt::Write as _;

use resvg::tiny_skia::Pixmap;

use super::{CaseTransform, TextAlign, TextFill, TextObject, TextPath};
use crate::error::DecodeError;
use crate::geometry::SurfaceSize;
use crate::layer::svg::rasterize_svg;
use crate::layer::FontLibrary;

/// Rough glyph advance as a fraction of the font size. Only used to size
/// the view box; the actual layout is done by the SVG renderer.
const ADVANCE_RATIO: f64 = 0.6;

const SVG_NS: &str = r#"xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink""#;

// ============================================================================
// Layout
// ============================================================================

/// Size of the local frame an object occupies, in unscaled pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub width: f64,
    pub height: f64,
}

/// The arc actually used for rendering. Degenerate radii render straight.
fn arc_of(text: &TextObject) -> Option<(f64, bool)> {
    match text.path {
        TextPath::None => None,
        TextPath::Arc { radius, invert } if radius.is_finite() && radius > 0.0 => {
            Some((radius, invert))
        }
        TextPath::Arc { radius, .. } => {
            tracing::warn!(
                "text {} has a degenerate arc radius {}, rendering straight",
                text.id,
                radius
            );
            None
        }
    }
}

fn lines_of(text: &TextObject) -> Vec<String> {
    let display = text.display_text();
    let lines: Vec<String> = display.lines().map(str::to_string).collect();
    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}

fn line_width(line: &str, text: &TextObject) -> f64 {
    let chars = line.chars().count() as f64;
    chars * text.size_px * ADVANCE_RATIO + (chars - 1.0).max(0.0) * text.tracking
}

/// Extra room around the glyphs for the outline and the shadow.
fn padding(text: &TextObject) -> (f64, f64) {
    let stroke = text.outline.as_ref().map_or(0.0, |o| o.width);
    let (sx, sy) = text.shadow.as_ref().map_or((0.0, 0.0), |s| {
        (s.dx.abs() + s.blur * 2.0, s.dy.abs() + s.blur * 2.0)
    });
    (stroke + sx, stroke + sy)
}

/// Estimated local frame of a text object.
pub fn extent(text: &TextObject) -> Extent {
    let size = text.size_px;
    let (pad_x, pad_y) = padding(text);
    let (width, height) = match arc_of(text) {
        Some((radius, false)) => (2.0 * radius + 2.0 * size, radius + 1.5 * size),
        Some((radius, true)) => (2.0 * radius + 2.0 * size, radius + size),
        None => {
            let lines = lines_of(text);
            let widest = lines
                .iter()
                .map(|line| line_width(line, text))
                .fold(0.0, f64::max);
            (
                widest.max(size),
                lines.len() as f64 * size * text.leading,
            )
        }
    };
    Extent {
        width: width + 2.0 * pad_x,
        height: height + 2.0 * pad_y,
    }
}

// ============================================================================
// Markup
// ============================================================================

/// Markup for one object in its local frame.
#[derive(Debug, Clone, Default)]
struct Fragment {
    defs: String,
    body: String,
}

fn fragment(text: &TextObject, key: &str) -> Fragment {
    let mut defs = String::new();
    let size = text.size_px;

    let fill = match &text.color {
        TextFill::Solid { value } => escape(value),
        TextFill::Gradient { angle_deg, stops } => {
            let _ = write!(
                defs,
                r#"<linearGradient id="fill-{key}" gradientTransform="rotate({} 0.5 0.5)">"#,
                num(*angle_deg)
            );
            for stop in stops {
                let _ = write!(
                    defs,
                    r#"<stop offset="{}" stop-color="{}"/>"#,
                    num(stop.offset),
                    escape(&stop.color)
                );
            }
            defs.push_str("</linearGradient>");
            format!("url(#fill-{key})")
        }
    };

    let mut attrs = format!(
        r#"font-family="{}" font-size="{}" fill="{}""#,
        escape(&text.font_family),
        num(size),
        fill
    );
    if text.tracking != 0.0 {
        let _ = write!(attrs, r#" letter-spacing="{}""#, num(text.tracking));
    }
    if text.case_transform == CaseTransform::SmallCaps {
        attrs.push_str(r#" font-variant="small-caps""#);
    }
    if let Some(outline) = &text.outline {
        let _ = write!(
            attrs,
            r#" stroke="{}" stroke-width="{}" stroke-linejoin="{}" paint-order="stroke""#,
            escape(&outline.color),
            num(outline.width),
            outline.join.as_svg()
        );
    }
    if let Some(shadow) = &text.shadow {
        let _ = write!(
            defs,
            r#"<filter id="shadow-{key}" x="-50%" y="-50%" width="200%" height="200%"><feDropShadow dx="{}" dy="{}" stdDeviation="{}" flood-color="{}" flood-opacity="{}"/></filter>"#,
            num(shadow.dx),
            num(shadow.dy),
            num(shadow.blur / 2.0),
            escape(&shadow.color),
            num(shadow.opacity)
        );
        let _ = write!(attrs, r#" filter="url(#shadow-{key})""#);
    }

    let mut body = String::new();
    match arc_of(text) {
        Some((radius, invert)) => {
            let (cy, sweep) = if invert {
                (-(radius + size) / 2.0 + 0.5 * size, 0)
            } else {
                ((radius + 1.5 * size) / 2.0 - 0.5 * size, 1)
            };
            let _ = write!(
                defs,
                r#"<path id="arc-{key}" d="M {},{} A {},{} 0 0 {} {},{}" fill="none"/>"#,
                num(-radius),
                num(cy),
                num(radius),
                num(radius),
                sweep,
                num(radius),
                num(cy)
            );
            let joined = lines_of(text).join(" ");
            let _ = write!(
                body,
                r##"<text {attrs} text-anchor="middle"><textPath xlink:href="#arc-{key}" startOffset="50%" text-anchor="middle">{}</textPath></text>"##,
                escape(&joined)
            );
        }
        None => {
            let lines = lines_of(text);
            let line_height = size * text.leading;
            let block = lines.len() as f64 * line_height;
            let widest = lines
                .iter()
                .map(|line| line_width(line, text))
                .fold(0.0, f64::max);
            let (anchor, x) = match text.align {
                TextAlign::Left => ("start", -widest / 2.0),
                TextAlign::Center => ("middle", 0.0),
                TextAlign::Right => ("end", widest / 2.0),
            };
            // First baseline sits one ascent (about 0.8em) below the top.
            let first_baseline = -block / 2.0 + (line_height - size) / 2.0 + size * 0.8;
            let _ = write!(
                body,
                r#"<text {attrs} text-anchor="{anchor}" x="{}" y="{}">"#,
                num(x),
                num(first_baseline)
            );
            for (i, line) in lines.iter().enumerate() {
                let dy = if i == 0 { 0.0 } else { line_height };
                let _ = write!(
                    body,
                    r#"<tspan x="{}" dy="{}">{}</tspan>"#,
                    num(x),
                    num(dy),
                    escape(line)
                );
            }
            body.push_str("</text>");
        }
    }

    Fragment { defs, body }
}

/// A self-contained SVG of one object fitted into `width x height`,
/// keeping its aspect ratio.
pub fn standalone_svg(text: &TextObject, width: u32, height: u32) -> String {
    let extent = extent(text);
    let Fragment { defs, body } = fragment(text, "t0");
    format!(
        r#"<svg {SVG_NS} width="{width}" height="{height}" viewBox="{} {} {} {}"><defs>{defs}</defs>{body}</svg>"#,
        num(-extent.width / 2.0),
        num(-extent.height / 2.0),
        num(extent.width),
        num(extent.height)
    )
}

/// A self-contained SVG of every visible object placed on the print area.
pub fn document(texts: &[TextObject], print_area: SurfaceSize) -> String {
    let mut defs = String::new();
    let mut body = String::new();
    for (i, text) in texts.iter().enumerate().filter(|(_, t)| t.visible) {
        let fragment = fragment(text, &format!("t{i}"));
        defs.push_str(&fragment.defs);
        let t = &text.transform;
        let _ = write!(
            body,
            r#"<g transform="translate({} {}) rotate({}) scale({})">{}</g>"#,
            num(t.x),
            num(t.y),
            num(t.rotate_deg),
            num(t.scale),
            fragment.body
        );
    }
    let (w, h) = (num(print_area.width), num(print_area.height));
    format!(
        r#"<svg {SVG_NS} width="{w}" height="{h}" viewBox="0 0 {w} {h}"><defs>{defs}</defs>{body}</svg>"#
    )
}

/// Rasterizes one object into a `width x height` pixmap.
pub fn rasterize(
    text: &TextObject,
    width: u32,
    height: u32,
    fonts: &FontLibrary,
) -> Result<Pixmap, DecodeError> {
    let svg = standalone_svg(text, width, height);
    rasterize_svg(svg.as_bytes(), width, height, fonts)
}

// ============================================================================
// Helpers
// ============================================================================

/// Formats a number with at most three decimals.
fn num(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        rounded.to_string()
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
