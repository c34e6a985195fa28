#![warn(missing_docs)]
//! Cooperative script threads driven by the host tick.
//!
//! Scripts run as if they executed synchronously and forever; the
//! [`Scheduler`] interleaves them with the host loop one tick pass at a time.
//! [`ScriptEngine`] binds the scheduler to Rhai.

mod engine;
mod error;
mod handle;
mod handoff;
mod input;
mod library;
mod scheduler;
mod sink;
mod task;
mod thread;

use anyhow::Result;
use tickscript_core::SimTick;

pub use engine::{Program, ScriptEngine, ScriptHost};
pub use error::{ScriptError, ScriptResult};
pub use handle::ThreadHandle;
pub use input::InputAggregator;
pub use scheduler::{Scheduler, SchedulerConfig, ThreadContext};
pub use sink::{CollectingSink, ErrorSink, TracingSink};
pub use task::{InMemoryTaskRegistry, NullTaskRegistry, TaskRegistry, TaskToken};
pub use thread::{SessionContext, ThreadId, ThreadStatus};

/// Invoked by the host loop once per tick.
pub trait TickHook {
    /// Called once per tick with the simulation tick about to complete.
    fn on_tick(&mut self, tick: SimTick) -> Result<()>;
}
