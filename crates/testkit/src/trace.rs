//! Tick traces: what happened during each tick of a scripted run.
//!
//! A run records events into an [`EventLog`] while the caller steps its host
//! for a fixed number of ticks. Each [`TraceFrame`] holds the events emitted
//! during one tick plus an observation of the host state afterwards. Frame 0
//! covers setup, before the first tick.

use crate::snapshot::assert_json_snapshot;
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tickscript_core::SimTick;

/// Cloneable, thread-safe event recorder shared with the code under test.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event.
    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    /// Take every event recorded since the last drain.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Events and observed state for one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TraceFrame<S> {
    /// Tick the frame covers.
    pub tick: u64,
    /// Events in emission order.
    pub events: Vec<String>,
    /// Caller-defined observation taken after the tick.
    pub state: S,
}

/// Whole run, ready to be compared with a golden file.
#[derive(Debug, Clone, Serialize)]
pub struct TickTrace<S> {
    /// Label written into the golden file.
    pub name: String,
    /// Setup frame followed by one frame per tick.
    pub frames: Vec<TraceFrame<S>>,
}

impl<S: Serialize> TickTrace<S> {
    /// Assert (or update) the golden file at `path`.
    pub fn assert_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        assert_json_snapshot(path, self)
    }
}

/// Step `host` for `ticks` ticks, recording one frame per tick.
pub fn record_ticks<H, S, Step, Observe>(
    name: &str,
    ticks: u64,
    log: &EventLog,
    host: &mut H,
    mut step: Step,
    mut observe: Observe,
) -> TickTrace<S>
where
    Step: FnMut(SimTick, &mut H),
    Observe: FnMut(&H) -> S,
{
    let mut frames = Vec::with_capacity(ticks as usize + 1);
    frames.push(TraceFrame {
        tick: 0,
        events: log.drain(),
        state: observe(host),
    });

    let mut tick = SimTick::ZERO;
    for _ in 0..ticks {
        tick = tick.advance(1);
        step(tick, host);
        frames.push(TraceFrame {
            tick: tick.0,
            events: log.drain(),
            state: observe(host),
        });
    }

    TickTrace {
        name: name.to_string(),
        frames,
    }
}
