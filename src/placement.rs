//! The authoritative placement record for one design layer.

use serde::{Deserialize, Serialize};

use crate::config::{BestFit, PlacementLimits};
use crate::error::GeometryError;
use crate::geometry::{PercentRect, Point, SurfaceSize, bearing_deg, delta_to_pct};

// ============================================================================
// ResizeDirection
// ============================================================================

/// One of the eight compass resize handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "jsonschema", derive(schemars::JsonSchema))]
pub enum ResizeDirection {
    N,
    S,
    E,
    W,
    Ne,
    Nw,
    Se,
    Sw,
}

impl ResizeDirection {
    pub const ALL: [ResizeDirection; 8] = [
        Self::Nw,
        Self::N,
        Self::Ne,
        Self::E,
        Self::Se,
        Self::S,
        Self::Sw,
        Self::W,
    ];

    fn moves_north(self) -> bool {
        matches!(self, Self::N | Self::Ne | Self::Nw)
    }

    fn moves_south(self) -> bool {
        matches!(self, Self::S | Self::Se | Self::Sw)
    }

    fn moves_east(self) -> bool {
        matches!(self, Self::E | Self::Ne | Self::Se)
    }

    fn moves_west(self) -> bool {
        matches!(self, Self::W | Self::Nw | Self::Sw)
    }

    /// Handle position as fractions of the box, `(0,0)` being top-left.
    pub fn anchor(self) -> (f64, f64) {
        let fx = if self.moves_west() {
            0.0
        } else if self.moves_east() {
            1.0
        } else {
            0.5
        };
        let fy = if self.moves_north() {
            0.0
        } else if self.moves_south() {
            1.0
        } else {
            0.5
        };
        (fx, fy)
    }
}

// ============================================================================
// PlacementState
// ============================================================================

/// Position, size, rotation and interaction flags of a design layer.
///
/// Setters clamp to [`PlacementLimits`] and ignore non-finite input, so the
/// state is always inside its documented ranges. At most one of
/// `dragging`, `resizing` and `rotating` is set at a time, and
/// `last_pointer` is only `Some` while one of them is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementState {
    top_pct: f64,
    left_pct: f64,
    width_pct: f64,
    height_pct: f64,
    rotate_deg: f64,
    zoom: f64,
    #[serde(skip)]
    selected: bool,
    #[serde(skip)]
    dragging: bool,
    #[serde(skip)]
    resizing: bool,
    #[serde(skip)]
    rotating: bool,
    #[serde(skip)]
    resize_direction: Option<ResizeDirection>,
    #[serde(skip)]
    last_pointer: Option<Point>,
    #[serde(skip)]
    limits: PlacementLimits,
}

impl PlacementState {
    /// Creates a placement at the best-fit position.
    pub fn new(best_fit: &BestFit, limits: PlacementLimits) -> Self {
        let mut state = Self {
            top_pct: 0.0,
            left_pct: 0.0,
            width_pct: limits.min_size_pct,
            height_pct: limits.min_size_pct,
            rotate_deg: 0.0,
            zoom: 1.0,
            selected: false,
            dragging: false,
            resizing: false,
            rotating: false,
            resize_direction: None,
            last_pointer: None,
            limits,
        };
        state.reset_to(best_fit);
        state
    }

    /// Creates a placement from stored percent values, clamping them.
    pub fn from_rect(rect: PercentRect, rotate_deg: f64, limits: PlacementLimits) -> Self {
        let mut state = Self::new(&BestFit::default(), limits);
        state.set_size(rect.width, rect.height);
        state.set_position(rect.top, rect.left);
        state.set_rotation(rotate_deg);
        state
    }

    pub fn top_pct(&self) -> f64 {
        self.top_pct
    }

    pub fn left_pct(&self) -> f64 {
        self.left_pct
    }

    pub fn width_pct(&self) -> f64 {
        self.width_pct
    }

    pub fn height_pct(&self) -> f64 {
        self.height_pct
    }

    pub fn rotate_deg(&self) -> f64 {
        self.rotate_deg
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_resizing(&self) -> bool {
        self.resizing
    }

    pub fn is_rotating(&self) -> bool {
        self.rotating
    }

    /// True while any pointer interaction is in progress.
    pub fn is_interacting(&self) -> bool {
        self.dragging || self.resizing || self.rotating
    }

    pub fn resize_direction(&self) -> Option<ResizeDirection> {
        self.resize_direction
    }

    pub fn last_pointer(&self) -> Option<Point> {
        self.last_pointer
    }

    pub fn limits(&self) -> &PlacementLimits {
        &self.limits
    }

    pub fn percent_rect(&self) -> PercentRect {
        PercentRect::new(self.top_pct, self.left_pct, self.width_pct, self.height_pct)
    }

    // ---- Setters ----

    pub fn set_position(&mut self, top_pct: f64, left_pct: f64) {
        if top_pct.is_finite() {
            self.top_pct = top_pct.clamp(0.0, 100.0);
        } else {
            tracing::warn!("ignoring non-finite top {}", top_pct);
        }
        if left_pct.is_finite() {
            self.left_pct = left_pct.clamp(0.0, 100.0);
        } else {
            tracing::warn!("ignoring non-finite left {}", left_pct);
        }
    }

    pub fn set_size(&mut self, width_pct: f64, height_pct: f64) {
        if let Some(width) = self.clamp_size(width_pct) {
            self.width_pct = width;
        }
        if let Some(height) = self.clamp_size(height_pct) {
            self.height_pct = height;
        }
    }

    /// Sets the rotation. Any finite value is kept as-is.
    pub fn set_rotation(&mut self, deg: f64) {
        if deg.is_finite() {
            self.rotate_deg = deg;
        } else {
            tracing::warn!("ignoring non-finite rotation {}", deg);
        }
    }

    pub fn set_zoom(&mut self, level: f64) {
        if level.is_finite() {
            self.zoom = level.clamp(self.limits.min_zoom, self.limits.max_zoom);
        } else {
            tracing::warn!("ignoring non-finite zoom {}", level);
        }
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    /// Replaces the limits and re-clamps the current size and zoom.
    pub fn set_limits(&mut self, limits: PlacementLimits) {
        self.limits = limits;
        let (width, height, zoom) = (self.width_pct, self.height_pct, self.zoom);
        self.set_size(width, height);
        self.set_zoom(zoom);
    }

    /// Moves the layer back to the best-fit placement.
    pub fn reset_to(&mut self, best_fit: &BestFit) {
        self.set_size(best_fit.width_pct, best_fit.height_pct);
        self.set_position(best_fit.top_pct, best_fit.left_pct);
        self.set_rotation(best_fit.rotate_deg);
    }

    /// Moves by a percent offset.
    pub fn nudge(&mut self, d_top: f64, d_left: f64) {
        self.set_position(self.top_pct + d_top, self.left_pct + d_left);
    }

    /// Grows (or shrinks, for negative values) both dimensions.
    pub fn grow(&mut self, delta_pct: f64) {
        self.set_size(self.width_pct + delta_pct, self.height_pct + delta_pct);
    }

    fn clamp_size(&self, value: f64) -> Option<f64> {
        if value.is_finite() {
            Some(value.clamp(self.limits.min_size_pct, self.limits.max_size_pct))
        } else {
            tracing::warn!("ignoring non-finite size {}", value);
            None
        }
    }

    // ---- Drag ----

    pub fn begin_drag(&mut self, pointer: Point) {
        self.clear_interaction();
        self.dragging = true;
        self.last_pointer = Some(pointer);
    }

    /// Applies the pointer movement since the last update.
    ///
    /// Returns the applied `(d_top, d_left)` percent change, which is zero
    /// when no drag is active.
    pub fn update_drag(&mut self, pointer: Point, surface: SurfaceSize) -> Point {
        let Some(last) = self.last_pointer.filter(|_| self.dragging) else {
            return Point::ZERO;
        };
        let delta = delta_to_pct(pointer.delta_from(last), surface);
        let sensitivity = self.limits.drag_sensitivity;
        let (top, left) = (self.top_pct, self.left_pct);
        self.set_position(
            top + delta.y * sensitivity,
            left + delta.x * sensitivity,
        );
        self.last_pointer = Some(pointer);
        Point::new(self.top_pct - top, self.left_pct - left)
    }

    pub fn end_drag(&mut self) {
        if self.dragging {
            self.clear_interaction();
        }
    }

    // ---- Resize ----

    pub fn begin_resize(&mut self, direction: ResizeDirection, pointer: Point) {
        self.clear_interaction();
        self.resizing = true;
        self.resize_direction = Some(direction);
        self.last_pointer = Some(pointer);
    }

    /// Applies the pointer movement to the active resize handle.
    ///
    /// East and south handles only grow the box. North and west handles
    /// shift `top`/`left` by the applied size change so that the opposite
    /// edge stays where it was.
    pub fn update_resize(&mut self, pointer: Point, surface: SurfaceSize) {
        let (Some(last), Some(direction)) = (self.last_pointer, self.resize_direction) else {
            return;
        };
        if !self.resizing {
            return;
        }
        let delta = delta_to_pct(pointer.delta_from(last), surface);
        let dx = delta.x * self.limits.resize_sensitivity;
        let dy = delta.y * self.limits.resize_sensitivity;

        let mut width = self.width_pct;
        let mut height = self.height_pct;
        if direction.moves_east() {
            width += dx;
        }
        if direction.moves_west() {
            width -= dx;
        }
        if direction.moves_south() {
            height += dy;
        }
        if direction.moves_north() {
            height -= dy;
        }

        let (old_width, old_height) = (self.width_pct, self.height_pct);
        self.set_size(width, height);
        let applied_w = self.width_pct - old_width;
        let applied_h = self.height_pct - old_height;

        let mut top = self.top_pct;
        let mut left = self.left_pct;
        if direction.moves_north() {
            top -= applied_h;
        }
        if direction.moves_west() {
            left -= applied_w / 2.0;
        }
        self.set_position(top, left);
        self.last_pointer = Some(pointer);
    }

    pub fn end_resize(&mut self) {
        if self.resizing {
            self.clear_interaction();
        }
    }

    // ---- Rotate ----

    pub fn begin_rotate(&mut self, pointer: Point) {
        self.clear_interaction();
        self.rotating = true;
        self.last_pointer = Some(pointer);
    }

    /// Rotates by the change in bearing of the pointer around the layer
    /// center on `surface`.
    ///
    /// When `snap_deg` is positive the resulting angle is rounded to a
    /// multiple of it.
    pub fn update_rotate(&mut self, pointer: Point, surface: SurfaceSize, snap_deg: Option<f64>) {
        let Some(last) = self.last_pointer.filter(|_| self.rotating) else {
            return;
        };
        let center = crate::geometry::pct_to_pixels(self.percent_rect(), surface).center();
        let mut swept = bearing_deg(center, pointer) - bearing_deg(center, last);
        if swept > 180.0 {
            swept -= 360.0;
        } else if swept < -180.0 {
            swept += 360.0;
        }
        let mut angle = self.rotate_deg + swept;
        if let Some(step) = snap_deg.filter(|s| *s > 0.0) {
            angle = (angle / step).round() * step;
        }
        self.set_rotation(angle);
        self.last_pointer = Some(pointer);
    }

    pub fn end_rotate(&mut self) {
        if self.rotating {
            self.clear_interaction();
        }
    }

    /// Ends whatever interaction is active.
    pub fn end_interaction(&mut self) {
        self.clear_interaction();
    }

    fn clear_interaction(&mut self) {
        self.dragging = false;
        self.resizing = false;
        self.rotating = false;
        self.resize_direction = None;
        self.last_pointer = None;
    }

    // ---- Validation ----

    /// Checks every field against its range.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let checks = [
            ("topPct", self.top_pct, 0.0, 100.0),
            ("leftPct", self.left_pct, 0.0, 100.0),
            (
                "widthPct",
                self.width_pct,
                self.limits.min_size_pct,
                self.limits.max_size_pct,
            ),
            (
                "heightPct",
                self.height_pct,
                self.limits.min_size_pct,
                self.limits.max_size_pct,
            ),
            ("zoom", self.zoom, self.limits.min_zoom, self.limits.max_zoom),
        ];
        for (field, value, min, max) in checks {
            if !value.is_finite() {
                return Err(GeometryError::NonFinite { field });
            }
            if value < min || value > max {
                return Err(GeometryError::OutOfRange {
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        if !self.rotate_deg.is_finite() {
            return Err(GeometryError::NonFinite { field: "rotateDeg" });
        }
        Ok(())
    }

    /// Returns the percent rect and rotation, clamped into range if the
    /// state was found invalid.
    pub fn sanitized(&self) -> (PercentRect, f64) {
        if let Err(err) = self.validate() {
            tracing::warn!("clamping invalid placement: {}", err);
            let finite = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
            let min = self.limits.min_size_pct;
            let max = self.limits.max_size_pct;
            let rect = PercentRect::new(
                finite(self.top_pct, 0.0).clamp(0.0, 100.0),
                finite(self.left_pct, 50.0).clamp(0.0, 100.0),
                finite(self.width_pct, min).clamp(min, max),
                finite(self.height_pct, min).clamp(min, max),
            );
            return (rect, finite(self.rotate_deg, 0.0));
        }
        (self.percent_rect(), self.rotate_deg)
    }
}

impl Default for PlacementState {
    fn default() -> Self {
        Self::new(&BestFit::default(), PlacementLimits::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::pct_to_pixels;
    use proptest::prelude::*;

    const TOL: f64 = 1e-9;

    fn at(top: f64, left: f64, width: f64, height: f64) -> PlacementState {
        PlacementState::from_rect(
            PercentRect::new(top, left, width, height),
            0.0,
            PlacementLimits::default(),
        )
    }

    fn surface() -> SurfaceSize {
        SurfaceSize::new(100.0, 100.0)
    }

    #[test]
    fn new_uses_best_fit() {
        let state = PlacementState::default();
        let fit = BestFit::default();
        assert_eq!(state.top_pct(), fit.top_pct);
        assert_eq!(state.left_pct(), fit.left_pct);
        assert_eq!(state.width_pct(), fit.width_pct);
        assert_eq!(state.height_pct(), fit.height_pct);
        assert_eq!(state.zoom(), 1.0);
        assert!(!state.is_interacting());
    }

    #[test]
    fn setters_clamp() {
        let mut state = PlacementState::default();
        state.set_position(-5.0, 140.0);
        assert_eq!((state.top_pct(), state.left_pct()), (0.0, 100.0));

        state.set_size(1.0, 500.0);
        assert_eq!((state.width_pct(), state.height_pct()), (10.0, 90.0));

        state.set_zoom(10.0);
        assert_eq!(state.zoom(), 3.0);
        state.set_zoom(0.0);
        assert_eq!(state.zoom(), 0.2);
    }

    #[test]
    fn rotation_is_not_normalized() {
        let mut state = PlacementState::default();
        state.set_rotation(725.0);
        assert_eq!(state.rotate_deg(), 725.0);
        state.set_rotation(-30.0);
        assert_eq!(state.rotate_deg(), -30.0);
    }

    #[test]
    fn non_finite_input_leaves_state_unchanged() {
        let mut state = PlacementState::default();
        let before = state.clone();
        state.set_position(f64::NAN, f64::INFINITY);
        state.set_size(f64::NAN, f64::NAN);
        state.set_rotation(f64::NAN);
        state.set_zoom(f64::NAN);
        assert_eq!(state, before);
    }

    #[test]
    fn se_resize_scenario() {
        let mut state = at(50.0, 50.0, 40.0, 40.0);
        state.begin_resize(ResizeDirection::Se, Point::new(0.0, 0.0));
        state.update_resize(Point::new(20.0, 20.0), surface());
        state.end_resize();

        assert!((state.width_pct() - 50.0).abs() < TOL);
        assert!((state.height_pct() - 50.0).abs() < TOL);
        assert_eq!(state.top_pct(), 50.0);
        assert_eq!(state.left_pct(), 50.0);
        assert!(!state.is_resizing());
        assert!(state.last_pointer().is_none());
    }

    #[test]
    fn nw_resize_keeps_south_east_corner() {
        let surface = SurfaceSize::new(400.0, 500.0);
        let mut state = at(40.0, 50.0, 30.0, 30.0);
        let before = pct_to_pixels(state.percent_rect(), surface);

        state.begin_resize(ResizeDirection::Nw, Point::new(100.0, 100.0));
        state.update_resize(Point::new(80.0, 70.0), surface);
        state.update_resize(Point::new(60.0, 50.0), surface);
        state.end_resize();

        let after = pct_to_pixels(state.percent_rect(), surface);
        assert!(state.width_pct() > 30.0);
        assert!(state.height_pct() > 30.0);
        assert!((after.right() - before.right()).abs() < 1e-6);
        assert!((after.bottom() - before.bottom()).abs() < 1e-6);
    }

    #[test]
    fn nw_resize_at_size_limit_keeps_corner() {
        let surface = SurfaceSize::new(100.0, 100.0);
        let mut state = at(40.0, 50.0, 85.0, 20.0);
        let before = pct_to_pixels(state.percent_rect(), surface);

        state.begin_resize(ResizeDirection::Nw, Point::new(50.0, 50.0));
        // Width would reach 95 but is clamped to 90.
        state.update_resize(Point::new(30.0, 40.0), surface);

        let after = pct_to_pixels(state.percent_rect(), surface);
        assert_eq!(state.width_pct(), 90.0);
        assert!((after.right() - before.right()).abs() < 1e-6);
        assert!((after.bottom() - before.bottom()).abs() < 1e-6);
    }

    #[test]
    fn north_and_west_handles_move_one_edge() {
        let mut state = at(40.0, 50.0, 30.0, 30.0);
        state.begin_resize(ResizeDirection::N, Point::new(0.0, 0.0));
        state.update_resize(Point::new(0.0, -10.0), surface());
        assert!((state.top_pct() - 35.0).abs() < TOL);
        assert!((state.height_pct() - 35.0).abs() < TOL);
        assert_eq!(state.width_pct(), 30.0);

        let mut state = at(40.0, 50.0, 30.0, 30.0);
        state.begin_resize(ResizeDirection::W, Point::new(0.0, 0.0));
        state.update_resize(Point::new(-10.0, 0.0), surface());
        assert!((state.width_pct() - 35.0).abs() < TOL);
        assert!((state.left_pct() - 47.5).abs() < TOL);
        assert_eq!(state.top_pct(), 40.0);
    }

    #[test]
    fn update_without_begin_is_ignored() {
        let mut state = PlacementState::default();
        let before = state.clone();
        state.update_resize(Point::new(50.0, 50.0), surface());
        let moved = state.update_drag(Point::new(50.0, 50.0), surface());
        assert_eq!(moved, Point::ZERO);
        assert_eq!(state, before);
    }

    #[test]
    fn drag_is_reversible() {
        let mut state = at(40.0, 50.0, 30.0, 30.0);
        state.begin_drag(Point::new(10.0, 10.0));
        state.update_drag(Point::new(22.0, 3.0), surface());
        state.update_drag(Point::new(10.0, 10.0), surface());
        state.end_drag();
        assert!((state.top_pct() - 40.0).abs() < TOL);
        assert!((state.left_pct() - 50.0).abs() < TOL);
    }

    #[test]
    fn interaction_flags_are_exclusive() {
        let mut state = PlacementState::default();
        state.set_selected(true);
        state.begin_drag(Point::ZERO);
        state.begin_resize(ResizeDirection::E, Point::ZERO);
        assert!(state.is_resizing());
        assert!(!state.is_dragging());
        state.begin_rotate(Point::ZERO);
        assert!(state.is_rotating());
        assert!(!state.is_resizing());
        assert!(state.resize_direction().is_none());
        state.end_rotate();
        assert!(!state.is_interacting());
        assert!(state.is_selected());
    }

    #[test]
    fn rotate_follows_pointer_bearing() {
        let surface = SurfaceSize::new(100.0, 100.0);
        // Center of {top 40, height 20} is at (50, 50).
        let mut state = at(40.0, 50.0, 20.0, 20.0);
        state.begin_rotate(Point::new(50.0, 0.0));
        state.update_rotate(Point::new(100.0, 50.0), surface, None);
        assert!((state.rotate_deg() - 90.0).abs() < 1e-6);

        state.update_rotate(Point::new(60.0, 100.0), surface, Some(15.0));
        assert_eq!(state.rotate_deg() % 15.0, 0.0);
    }

    #[test]
    fn validate_and_sanitize() {
        let state = PlacementState::default();
        assert!(state.validate().is_ok());

        let mut broken = PlacementState::default();
        broken.width_pct = 120.0;
        broken.top_pct = f64::NAN;
        assert!(broken.validate().is_err());
        let (rect, _) = broken.sanitized();
        assert_eq!(rect.width, 90.0);
        assert_eq!(rect.top, 0.0);
    }

    proptest! {
        #[test]
        fn set_size_is_idempotent(w in -1e4f64..1e4, h in -1e4f64..1e4) {
            let mut state = PlacementState::default();
            state.set_size(w, h);
            let once = (state.width_pct(), state.height_pct());
            prop_assert!((10.0..=90.0).contains(&once.0));
            prop_assert!((10.0..=90.0).contains(&once.1));
            for _ in 0..10 {
                state.set_size(once.0, once.1);
            }
            prop_assert_eq!((state.width_pct(), state.height_pct()), once);
        }

        #[test]
        fn se_resize_never_moves_anchor(dx in -200.0f64..200.0, dy in -200.0f64..200.0) {
            let mut state = at(30.0, 60.0, 40.0, 40.0);
            state.begin_resize(ResizeDirection::Se, Point::ZERO);
            state.update_resize(Point::new(dx, dy), SurfaceSize::new(300.0, 300.0));
            prop_assert_eq!(state.top_pct(), 30.0);
            prop_assert_eq!(state.left_pct(), 60.0);
        }
    }
}
