//! Percent-space to pixel-space transform math.
//!
//! Placements are stored as percentages of the print area so they survive
//! any change of surface resolution. Every surface (the live preview, the
//! export raster, a thumbnail) converts through the functions here, which
//! is what keeps them in agreement.
//!
//! # Anchor convention
//!
//! The horizontal anchor is the **center** of the layer while the vertical
//! anchor is its **top edge**:
//!
//! ```text
//! x = surface.width  * left / 100 - width / 2
//! y = surface.height * top  / 100
//! ```
//!
//! Stored placements depend on this asymmetry, so it must not be changed.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// A 2D point or vector in pixel (or percent) units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Vector from `origin` to `self`.
    pub fn delta_from(&self, origin: Point) -> Point {
        Point::new(self.x - origin.x, self.y - origin.y)
    }

    pub fn distance_to(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// The size of a drawing surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Returns this size multiplied by `factor` on both axes.
    pub fn scaled(&self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Whole-pixel dimensions, rounded up and never below one pixel.
    pub fn to_pixels(&self) -> (u32, u32) {
        (
            self.width.ceil().max(1.0) as u32,
            self.height.ceil().max(1.0) as u32,
        )
    }

    /// Returns true if either side is zero, negative or non-finite.
    pub fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

/// A placement expressed in percent of the print area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub struct PercentRect {
    /// Top edge, percent of surface height.
    pub top: f64,
    /// Horizontal center, percent of surface width.
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

impl PercentRect {
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }
}

/// A rectangle in pixel coordinates with its origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Corners in `[nw, ne, se, sw]` order after rotating the rectangle by
    /// `rotate_deg` about its own center.
    pub fn corners(&self, rotate_deg: f64) -> [Point; 4] {
        let center = self.center();
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
        .map(|corner| rotate_around_center(corner, center, rotate_deg))
    }
}

/// Converts degrees to radians.
pub fn deg_to_rad(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Projects a percent placement onto a surface.
pub fn pct_to_pixels(pct: PercentRect, surface: SurfaceSize) -> PixelRect {
    let width = surface.width * (pct.width / 100.0);
    let height = surface.height * (pct.height / 100.0);
    let x = surface.width * (pct.left / 100.0) - width / 2.0;
    let y = surface.height * (pct.top / 100.0);
    PixelRect::new(x, y, width, height)
}

/// Inverse of [`pct_to_pixels`].
///
/// A degenerate surface maps everything to zero percent.
pub fn pixels_to_pct(rect: PixelRect, surface: SurfaceSize) -> PercentRect {
    let width = delta_pixels_to_pct(rect.width, surface.width);
    let height = delta_pixels_to_pct(rect.height, surface.height);
    let left = delta_pixels_to_pct(rect.x + rect.width / 2.0, surface.width);
    let top = delta_pixels_to_pct(rect.y, surface.height);
    PercentRect::new(top, left, width, height)
}

/// Converts a pixel distance along one axis into percent of that axis.
pub fn delta_pixels_to_pct(delta_px: f64, surface_dimension: f64) -> f64 {
    if surface_dimension == 0.0 || !surface_dimension.is_finite() {
        return 0.0;
    }
    (delta_px / surface_dimension) * 100.0
}

/// Converts a 2D pointer movement into percent of the surface.
pub fn delta_to_pct(delta: Point, surface: SurfaceSize) -> Point {
    Point::new(
        delta_pixels_to_pct(delta.x, surface.width),
        delta_pixels_to_pct(delta.y, surface.height),
    )
}

/// Rotates `point` about `center` by `deg` degrees (clockwise on a y-down
/// surface).
pub fn rotate_around_center(point: Point, center: Point, deg: f64) -> Point {
    let rad = deg_to_rad(deg);
    let (sin, cos) = rad.sin_cos();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    Point::new(
        center.x + dx * cos - dy * sin,
        center.y + dx * sin + dy * cos,
    )
}

/// Angle in degrees of the vector from `center` to `point`, measured from
/// straight up and increasing clockwise.
pub fn bearing_deg(center: Point, point: Point) -> f64 {
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    dx.atan2(-dy).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn horizontal_anchor_is_centered_vertical_is_top() {
        let px = pct_to_pixels(
            PercentRect::new(10.0, 50.0, 40.0, 20.0),
            SurfaceSize::new(400.0, 500.0),
        );
        assert!((px.width - 160.0).abs() < EPS);
        assert!((px.height - 100.0).abs() < EPS);
        assert!((px.x - 120.0).abs() < EPS);
        assert!((px.y - 50.0).abs() < EPS);
        assert!((px.center().x - 200.0).abs() < EPS);
    }

    #[test]
    fn delta_conversion() {
        assert!((delta_pixels_to_pct(50.0, 200.0) - 25.0).abs() < EPS);
        assert_eq!(delta_pixels_to_pct(50.0, 0.0), 0.0);

        let d = delta_to_pct(Point::new(20.0, -10.0), SurfaceSize::new(100.0, 50.0));
        assert!((d.x - 20.0).abs() < EPS);
        assert!((d.y + 20.0).abs() < EPS);
    }

    #[test]
    fn rotate_quarter_turn() {
        let p = rotate_around_center(Point::new(10.0, 0.0), Point::ZERO, 90.0);
        assert!(p.x.abs() < EPS);
        assert!((p.y - 10.0).abs() < EPS);
    }

    #[test]
    fn corners_unrotated() {
        let rect = PixelRect::new(0.0, 0.0, 10.0, 20.0);
        let [nw, ne, se, sw] = rect.corners(0.0);
        assert_eq!(nw, Point::new(0.0, 0.0));
        assert_eq!(ne, Point::new(10.0, 0.0));
        assert_eq!(se, Point::new(10.0, 20.0));
        assert_eq!(sw, Point::new(0.0, 20.0));
    }

    #[test]
    fn bearing_is_clockwise_from_up() {
        let c = Point::ZERO;
        assert!(bearing_deg(c, Point::new(0.0, -1.0)).abs() < EPS);
        assert!((bearing_deg(c, Point::new(1.0, 0.0)) - 90.0).abs() < EPS);
        assert!((bearing_deg(c, Point::new(0.0, 1.0)).abs() - 180.0).abs() < EPS);
    }

    #[test]
    fn degenerate_surface() {
        assert!(SurfaceSize::new(0.0, 10.0).is_degenerate());
        assert!(SurfaceSize::new(f64::NAN, 10.0).is_degenerate());
        assert!(!SurfaceSize::new(1.0, 1.0).is_degenerate());
    }

    proptest! {
        #[test]
        fn percent_pixel_round_trip(
            top in 0.0f64..=100.0,
            left in 0.0f64..=100.0,
            width in 10.0f64..=90.0,
            height in 10.0f64..=90.0,
            sw in 1.0f64..5000.0,
            sh in 1.0f64..5000.0,
        ) {
            let pct = PercentRect::new(top, left, width, height);
            let surface = SurfaceSize::new(sw, sh);
            let back = pixels_to_pct(pct_to_pixels(pct, surface), surface);
            prop_assert!(close(back.top, top));
            prop_assert!(close(back.left, left));
            prop_assert!(close(back.width, width));
            prop_assert!(close(back.height, height));
        }
    }
}
