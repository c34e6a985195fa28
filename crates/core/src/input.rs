//! Per-tick movement input shared by the host player and script threads.

use serde::{Deserialize, Serialize};

/// Movement multiplier applied while sneaking (or in a sneaking pose).
pub const SNEAK_SPEED_FACTOR: f32 = 0.3;

/// Directional key state plus the movement vector derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementInput {
    /// Forward key held.
    pub pressing_forward: bool,
    /// Back key held.
    pub pressing_back: bool,
    /// Strafe-left key held.
    pub pressing_left: bool,
    /// Strafe-right key held.
    pub pressing_right: bool,
    /// Jump key held.
    pub jumping: bool,
    /// Sneak key held.
    pub sneaking: bool,
    /// Forward magnitude in `[-1, 1]`, positive is forward.
    pub movement_forward: f32,
    /// Sideways magnitude in `[-1, 1]`, positive is left.
    pub movement_sideways: f32,
}

impl MovementInput {
    /// Input with nothing pressed.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Recompute the movement vector from the pressing flags.
    ///
    /// Opposing keys cancel out, matching direct keyboard handling. The sneak
    /// factor applies when `sneaking` is held or the player is already in a
    /// sneaking pose.
    pub fn recompute_movement(&mut self, in_sneaking_pose: bool) {
        self.movement_forward = axis(self.pressing_forward, self.pressing_back);
        self.movement_sideways = axis(self.pressing_left, self.pressing_right);
        if self.sneaking || in_sneaking_pose {
            self.movement_forward *= SNEAK_SPEED_FACTOR;
            self.movement_sideways *= SNEAK_SPEED_FACTOR;
        }
    }

    /// OR the pressing flags of `other` into `self`.
    ///
    /// The derived movement vector is left untouched; call
    /// [`MovementInput::recompute_movement`] afterwards.
    pub fn merge_pressed(&mut self, other: &MovementInput) {
        self.pressing_forward |= other.pressing_forward;
        self.pressing_back |= other.pressing_back;
        self.pressing_left |= other.pressing_left;
        self.pressing_right |= other.pressing_right;
        self.jumping |= other.jumping;
        self.sneaking |= other.sneaking;
    }

    /// True if any directional, jump or sneak key is held.
    pub fn any_pressed(&self) -> bool {
        self.pressing_forward
            || self.pressing_back
            || self.pressing_left
            || self.pressing_right
            || self.jumping
            || self.sneaking
    }
}

fn axis(positive: bool, negative: bool) -> f32 {
    (positive as i32 - negative as i32) as f32
}
