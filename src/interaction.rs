//! Pointer and keyboard interaction with design layers.
//!
//! [`InteractionController`] is a small state machine on top of the
//! placement methods: a pointer-down picks the mode from what was hit, moves
//! are forwarded to the matching `update_*` call, and pointer-up returns to
//! [`InteractionState::Idle`]. Only one layer can be under interaction at a
//! time.

use serde::{Deserialize, Serialize};

use crate::config::{BestFit, InteractionSettings};
use crate::error::ValidationError;
use crate::geometry::{PixelRect, Point, SurfaceSize, pct_to_pixels, rotate_around_center};
use crate::layer::{DesignLayer, LayerId};
use crate::placement::{PlacementState, ResizeDirection};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Dragging,
    Resizing(ResizeDirection),
    Rotating,
}

/// What a pointer landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "direction", rename_all = "camelCase")]
pub enum Hit {
    Handle(ResizeDirection),
    RotateHandle,
    Body,
}

/// Corners first so that small boxes still resize diagonally.
const HIT_ORDER: [ResizeDirection; 8] = [
    ResizeDirection::Nw,
    ResizeDirection::Ne,
    ResizeDirection::Se,
    ResizeDirection::Sw,
    ResizeDirection::N,
    ResizeDirection::E,
    ResizeDirection::S,
    ResizeDirection::W,
];

/// Screen positions of a layer's handles.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlePositions {
    pub resize: Vec<(ResizeDirection, Point)>,
    pub rotate: Point,
}

/// Handle positions for `rect` rotated by `rotate_deg`.
pub fn handle_positions(rect: PixelRect, rotate_deg: f64, rotate_offset: f64) -> HandlePositions {
    let center = rect.center();
    let place = |local: Point| rotate_around_center(local, center, rotate_deg);
    let resize = ResizeDirection::ALL
        .iter()
        .map(|&dir| {
            let (fx, fy) = dir.anchor();
            (
                dir,
                place(Point::new(rect.x + fx * rect.width, rect.y + fy * rect.height)),
            )
        })
        .collect();
    HandlePositions {
        resize,
        rotate: place(Point::new(center.x, rect.y - rotate_offset)),
    }
}

/// Keys the controller understands, named after DOM `KeyboardEvent.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Escape,
    Delete,
    Backspace,
    Char(char),
}

impl Key {
    pub fn from_name(name: &str) -> Option<Self> {
        let key = match name {
            "ArrowUp" => Self::ArrowUp,
            "ArrowDown" => Self::ArrowDown,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            "Escape" | "Esc" => Self::Escape,
            "Delete" | "Del" => Self::Delete,
            "Backspace" => Self::Backspace,
            _ => {
                let mut chars = name.chars();
                let c = chars.next()?;
                if chars.next().is_some() {
                    return None;
                }
                Self::Char(c)
            }
        };
        Some(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        alt: false,
        ctrl: false,
        meta: false,
    };

    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::NONE
        }
    }

    pub fn alt() -> Self {
        Self {
            alt: true,
            ..Self::NONE
        }
    }

    fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// A keyboard action on the selected layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCommand {
    Nudge { d_top: f64, d_left: f64 },
    Resize { delta_pct: f64 },
    Rotate { delta_deg: f64 },
    ResetToBestFit,
    Deselect,
    Remove,
}

/// True if `pointer` lies inside the rotated box of `placement`.
pub fn body_contains(placement: &PlacementState, surface: SurfaceSize, pointer: Point) -> bool {
    let rect = pct_to_pixels(placement.percent_rect(), surface);
    let local = rotate_around_center(pointer, rect.center(), -placement.rotate_deg());
    local.x >= rect.x && local.x <= rect.right() && local.y >= rect.y && local.y <= rect.bottom()
}

// ============================================================================
// InteractionController
// ============================================================================

#[derive(Debug, Clone)]
pub struct InteractionController {
    state: InteractionState,
    active: Option<LayerId>,
    /// Unsnapped horizontal position while dragging.
    raw_left: f64,
    snap_rotation: bool,
    settings: InteractionSettings,
}

impl InteractionController {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            state: InteractionState::Idle,
            active: None,
            raw_left: 0.0,
            snap_rotation: false,
            settings,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// The layer currently being dragged, resized or rotated.
    pub fn active_layer(&self) -> Option<&LayerId> {
        self.active.as_ref()
    }

    pub fn settings(&self) -> &InteractionSettings {
        &self.settings
    }

    /// Rounds rotation to multiples of `rotation_snap_deg` while rotating.
    pub fn set_snap_rotation(&mut self, snap: bool) {
        self.snap_rotation = snap;
    }

    /// Starts an interaction on `layer` and selects it.
    pub fn pointer_down(
        &mut self,
        layer: &mut DesignLayer,
        hit: Hit,
        pointer: Point,
    ) -> Result<(), ValidationError> {
        if let Some(active) = &self.active {
            if active != layer.id() {
                return Err(ValidationError::InteractionBusy {
                    active: active.clone(),
                });
            }
        }
        if layer.is_locked() {
            return Err(ValidationError::LayerLocked(layer.id().clone()));
        }

        let placement = layer.placement_mut();
        placement.set_selected(true);
        self.state = match hit {
            Hit::Body => {
                self.raw_left = placement.left_pct();
                placement.begin_drag(pointer);
                InteractionState::Dragging
            }
            Hit::Handle(direction) => {
                placement.begin_resize(direction, pointer);
                InteractionState::Resizing(direction)
            }
            Hit::RotateHandle => {
                placement.begin_rotate(pointer);
                InteractionState::Rotating
            }
        };
        self.active = Some(layer.id().clone());
        tracing::debug!("{} -> {:?}", layer.id(), self.state);
        Ok(())
    }

    /// Forwards a pointer move to the active interaction. Returns false if
    /// `layer` is not the one being interacted with.
    pub fn pointer_move(&mut self, layer: &mut DesignLayer, pointer: Point, surface: SurfaceSize) -> bool {
        if self.active.as_ref() != Some(layer.id()) {
            return false;
        }
        let threshold = self.settings.snap_threshold_pct;
        let snap_deg = self
            .snap_rotation
            .then_some(self.settings.rotation_snap_deg);
        let placement = layer.placement_mut();
        match self.state {
            InteractionState::Idle => return false,
            InteractionState::Dragging => {
                let top = placement.top_pct();
                placement.set_position(top, self.raw_left);
                placement.update_drag(pointer, surface);
                self.raw_left = placement.left_pct();
                if threshold > 0.0 && (self.raw_left - 50.0).abs() <= threshold {
                    let top = placement.top_pct();
                    placement.set_position(top, 50.0);
                }
            }
            InteractionState::Resizing(_) => placement.update_resize(pointer, surface),
            InteractionState::Rotating => placement.update_rotate(pointer, surface, snap_deg),
        }
        true
    }

    /// Ends the interaction on `layer`. Does nothing for other layers.
    pub fn pointer_up(&mut self, layer: &mut DesignLayer) {
        if self.active.as_ref() != Some(layer.id()) {
            return;
        }
        layer.placement_mut().end_interaction();
        tracing::debug!("{} -> Idle", layer.id());
        self.reset();
    }

    /// Forgets the active interaction without touching any layer, e.g.
    /// after the active layer was removed.
    pub fn reset(&mut self) {
        self.state = InteractionState::Idle;
        self.active = None;
    }

    /// What the pointer is over, testing the rotate handle, then resize
    /// handles, then the body.
    pub fn hit_test(&self, placement: &PlacementState, surface: SurfaceSize, pointer: Point) -> Option<Hit> {
        let rect = pct_to_pixels(placement.percent_rect(), surface);
        let center = rect.center();
        let local = rotate_around_center(pointer, center, -placement.rotate_deg());
        let radius = self.settings.handle_radius_px;

        let rotate = Point::new(center.x, rect.y - self.settings.rotate_handle_offset_px);
        if local.distance_to(rotate) <= radius {
            return Some(Hit::RotateHandle);
        }
        for dir in HIT_ORDER {
            let (fx, fy) = dir.anchor();
            let handle = Point::new(rect.x + fx * rect.width, rect.y + fy * rect.height);
            if local.distance_to(handle) <= radius {
                return Some(Hit::Handle(dir));
            }
        }
        body_contains(placement, surface, pointer).then_some(Hit::Body)
    }

    /// Maps a key press to a command, if any.
    pub fn key_command(&self, key: Key, modifiers: Modifiers) -> Option<KeyCommand> {
        let s = &self.settings;
        if modifiers.command() {
            return match key {
                Key::Char('f' | 'F') if modifiers.shift => Some(KeyCommand::ResetToBestFit),
                _ => None,
            };
        }
        let nudge = if modifiers.shift {
            s.nudge_coarse_pct
        } else if modifiers.alt {
            s.nudge_fine_pct
        } else {
            s.nudge_step_pct
        };
        let rotate = if modifiers.shift {
            s.rotate_step_deg * 3.0
        } else {
            s.rotate_step_deg
        };
        let command = match key {
            Key::ArrowUp => KeyCommand::Nudge {
                d_top: -nudge,
                d_left: 0.0,
            },
            Key::ArrowDown => KeyCommand::Nudge {
                d_top: nudge,
                d_left: 0.0,
            },
            Key::ArrowLeft => KeyCommand::Nudge {
                d_top: 0.0,
                d_left: -nudge,
            },
            Key::ArrowRight => KeyCommand::Nudge {
                d_top: 0.0,
                d_left: nudge,
            },
            Key::Char('+' | '=') => KeyCommand::Resize {
                delta_pct: s.resize_step_pct,
            },
            Key::Char('-' | '_') => KeyCommand::Resize {
                delta_pct: -s.resize_step_pct,
            },
            Key::Char('[' | '{') => KeyCommand::Rotate { delta_deg: -rotate },
            Key::Char(']' | '}') => KeyCommand::Rotate { delta_deg: rotate },
            Key::Escape => KeyCommand::Deselect,
            Key::Delete | Key::Backspace => KeyCommand::Remove,
            Key::Char(_) => return None,
        };
        Some(command)
    }

    /// Applies a keyboard command to `layer`.
    ///
    /// [`KeyCommand::Remove`] is left to whoever owns the layer list.
    pub fn apply_key(
        &mut self,
        layer: &mut DesignLayer,
        command: KeyCommand,
        best_fit: &BestFit,
    ) -> Result<(), ValidationError> {
        if layer.is_locked() && command != KeyCommand::Deselect {
            return Err(ValidationError::LayerLocked(layer.id().clone()));
        }
        let placement = layer.placement_mut();
        match command {
            KeyCommand::Nudge { d_top, d_left } => placement.nudge(d_top, d_left),
            KeyCommand::Resize { delta_pct } => placement.grow(delta_pct),
            KeyCommand::Rotate { delta_deg } => {
                let angle = placement.rotate_deg() + delta_deg;
                placement.set_rotation(angle);
            }
            KeyCommand::ResetToBestFit => placement.reset_to(best_fit),
            KeyCommand::Deselect => placement.set_selected(false),
            KeyCommand::Remove => {}
        }
        Ok(())
    }
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(InteractionSettings::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
