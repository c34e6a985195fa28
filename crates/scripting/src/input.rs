//! Combines the input contributed by live script threads with the player's own.

use crate::thread::ThreadInstance;
use std::sync::Arc;
use tickscript_core::MovementInput;

/// Snapshot of the live threads taken at the start of an input pass.
///
/// Killed threads stop contributing immediately, even before they unwind.
/// Paused threads keep contributing; they are still alive.
#[derive(Debug, Clone)]
pub struct InputAggregator {
    threads: Vec<Arc<ThreadInstance>>,
}

impl InputAggregator {
    pub(crate) fn new(threads: Vec<Arc<ThreadInstance>>) -> Self {
        Self {
            threads: threads
                .into_iter()
                .filter(|thread| thread.is_running() && !thread.is_killed())
                .collect(),
        }
    }

    /// Number of threads contributing to this pass.
    pub fn contributors(&self) -> usize {
        self.threads.len()
    }

    /// OR every thread's keys into `player` and recompute its movement vector.
    pub fn apply(&self, player: &mut MovementInput, in_sneaking_pose: bool) {
        for thread in &self.threads {
            player.merge_pressed(&thread.input());
        }
        player.recompute_movement(in_sneaking_pose);
    }

    /// True if any thread suppresses the player's interactive input.
    pub fn blocking_input(&self) -> bool {
        self.threads.iter().any(|thread| thread.is_blocking_input())
    }

    /// True if any thread requests sprinting.
    pub fn is_sprinting(&self) -> bool {
        self.threads.iter().any(|thread| thread.is_sprinting())
    }

    /// Sprint state for this tick given the player's own sprint key.
    ///
    /// The key is ignored while a thread blocks input.
    pub fn effective_sprint(&self, key_pressed: bool) -> bool {
        (key_pressed && !self.blocking_input()) || self.is_sprinting()
    }
}
