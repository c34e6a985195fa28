#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod input;

use serde::{Deserialize, Serialize};

pub use input::{MovementInput, SNEAK_SPEED_FACTOR};

/// Fixed tick type (20 TPS => 50 ms per tick).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick of every host run.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }
}

impl std::fmt::Display for SimTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_advances_and_orders() {
        let tick = SimTick::ZERO.advance(3);
        assert_eq!(tick, SimTick(3));
        assert!(SimTick::ZERO < tick);
        assert_eq!(tick.to_string(), "3");
    }

    #[test]
    fn tick_serializes_as_plain_integer() {
        let json = serde_json::to_string(&SimTick(42)).expect("serialize");
        assert_eq!(json, "42");
    }
}
