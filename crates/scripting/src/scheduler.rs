//! Single-token cooperative scheduler for script threads.
//!
//! Each script thread runs on its own OS thread, but only one of them (or the
//! host) executes at any instant. The token moves through the per-thread
//! [`Handoff`](crate::handoff::Handoff) rendezvous:
//!
//! - [`Scheduler::advance`] (host, once per tick) resumes every eligible thread
//!   in registration order and waits for each to hand the token back.
//! - [`Scheduler::yield_now`] (script) hands the token back and blocks until
//!   the next advance.
//! - Starting a thread from inside another thread transfers the token to the
//!   child until it first yields or finishes.
//!
//! A thread that never yields can be neither paused nor killed.

use crate::error::{ScriptError, ScriptResult};
use crate::handle::ThreadHandle;
use crate::handoff::Handback;
use crate::input::InputAggregator;
use crate::sink::{ErrorSink, TracingSink};
use crate::task::{NullTaskRegistry, TaskRegistry};
use crate::thread::{SessionContext, ThreadBody, ThreadId, ThreadInstance, ThreadStatus};
use crate::TickHook;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tickscript_core::SimTick;
use tracing::{debug, error, trace, warn};

/// Scheduler tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Task-registry group every script thread is registered under.
    pub task_group: String,
    /// Prefix of the OS thread names (`"<prefix> <id>"`).
    pub thread_name_prefix: String,
    /// Advance passes [`Scheduler::shutdown`] spends unwinding killed threads.
    pub shutdown_passes: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_group: "cscript".to_string(),
            thread_name_prefix: "script thread".to_string(),
            shutdown_passes: 8,
        }
    }
}

struct SchedulerInner {
    config: SchedulerConfig,
    /// Live threads in registration order. Holds exactly the running threads.
    registry: Mutex<Vec<Arc<ThreadInstance>>>,
    /// Threads currently holding (or lending) the token; the top executes.
    stack: Mutex<Vec<Arc<ThreadInstance>>>,
    tasks: Arc<dyn TaskRegistry>,
    sink: Arc<dyn ErrorSink>,
    next_id: AtomicU64,
    main: OnceLock<Arc<ThreadInstance>>,
}

/// Registry of live script threads plus the handshake engine that drives them.
///
/// Cloning is cheap and every clone drives the same set of threads.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(
            SchedulerConfig::default(),
            Arc::new(NullTaskRegistry),
            Arc::new(TracingSink),
        )
    }
}

impl Scheduler {
    /// Create a scheduler reporting to `tasks` and `sink`.
    pub fn new(
        config: SchedulerConfig,
        tasks: Arc<dyn TaskRegistry>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                registry: Mutex::new(Vec::new()),
                stack: Mutex::new(Vec::new()),
                tasks,
                sink,
                next_id: AtomicU64::new(1),
                main: OnceLock::new(),
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    fn registry(&self) -> MutexGuard<'_, Vec<Arc<ThreadInstance>>> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stack(&self) -> MutexGuard<'_, Vec<Arc<ThreadInstance>>> {
        self.inner
            .stack
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a detached thread. It does nothing until [`ThreadHandle::run`].
    pub fn create<F>(&self, daemon: bool, body: F) -> ThreadHandle
    where
        F: FnOnce(ThreadContext) -> ScriptResult + Send + 'static,
    {
        self.create_inner(daemon, Box::new(body), None)
    }

    /// Like [`Scheduler::create`], attaching a session the thread enters while it executes.
    ///
    /// Threads created without a session inherit their parent's when started.
    pub fn create_with_session<F>(
        &self,
        daemon: bool,
        session: Arc<dyn SessionContext>,
        body: F,
    ) -> ThreadHandle
    where
        F: FnOnce(ThreadContext) -> ScriptResult + Send + 'static,
    {
        self.create_inner(daemon, Box::new(body), Some(session))
    }

    fn create_inner(
        &self,
        daemon: bool,
        body: ThreadBody,
        session: Option<Arc<dyn SessionContext>>,
    ) -> ThreadHandle {
        let id = ThreadId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let instance = Arc::new(ThreadInstance::new(id, daemon, Some(body), session));
        self.wrap(instance)
    }

    pub(crate) fn wrap(&self, instance: Arc<ThreadInstance>) -> ThreadHandle {
        ThreadHandle::from_parts(self.clone(), instance)
    }

    /// Thread whose code is executing on the calling OS thread, if any.
    pub fn current(&self) -> Option<ThreadHandle> {
        self.calling_thread().map(|instance| self.wrap(instance))
    }

    /// Like [`Scheduler::current`], falling back to a sentinel for the host's own thread.
    ///
    /// The sentinel is created on first use, is never registered and never runs.
    pub fn current_or_main(&self) -> ThreadHandle {
        self.current().unwrap_or_else(|| {
            let main = self
                .inner
                .main
                .get_or_init(|| Arc::new(ThreadInstance::new(ThreadId::MAIN, false, None, None)));
            self.wrap(Arc::clone(main))
        })
    }

    /// Top of the token stack, but only when asked from that thread's own OS thread.
    pub(crate) fn calling_thread(&self) -> Option<Arc<ThreadInstance>> {
        let top = self.stack().last().cloned()?;
        (top.os_thread() == Some(std::thread::current().id())).then_some(top)
    }

    /// Handles for every live thread, in registration order.
    pub fn live_threads(&self) -> Vec<ThreadHandle> {
        let live = self.registry().clone();
        live.into_iter().map(|instance| self.wrap(instance)).collect()
    }

    pub(crate) fn live_instances(&self) -> Vec<Arc<ThreadInstance>> {
        self.registry().clone()
    }

    /// Number of live threads.
    pub fn thread_count(&self) -> usize {
        self.registry().len()
    }

    /// True when no script thread is registered.
    pub fn is_idle(&self) -> bool {
        self.registry().is_empty()
    }

    /// Read-only view over the input contributed by live threads.
    pub fn input(&self) -> InputAggregator {
        InputAggregator::new(self.live_instances())
    }

    /// Start `thread`. See [`ThreadHandle::run`].
    pub(crate) fn start(&self, thread: &Arc<ThreadInstance>) -> ScriptResult {
        if thread.is_main() {
            return Ok(());
        }

        let body = {
            let mut state = thread.state();
            match state.status {
                ThreadStatus::Created => {}
                ThreadStatus::Running => return Ok(()),
                _ => return Err(ScriptError::AlreadyFinished(thread.id().0)),
            }
            if thread.is_killed() {
                state.status = ThreadStatus::Killed;
                state.body = None;
                debug!(thread = %thread.id(), "killed before start; body skipped");
                return Ok(());
            }
            match state.body.take() {
                Some(body) => {
                    state.status = ThreadStatus::Running;
                    body
                }
                None => return Err(ScriptError::AlreadyFinished(thread.id().0)),
            }
        };

        let parent = self.stack().last().cloned();
        if let Some(parent) = &parent {
            if parent.os_thread() != Some(std::thread::current().id()) {
                let mut state = thread.state();
                state.status = ThreadStatus::Created;
                state.body = Some(body);
                return Err(ScriptError::NotInScriptThread);
            }
        }

        self.inner
            .tasks
            .register(&self.inner.config.task_group, Arc::clone(&thread.task));
        thread.set_running(true);
        self.registry().push(Arc::clone(thread));

        if let Some(parent) = &parent {
            parent.state().children.push(Arc::clone(thread));
            let inherited = parent.session();
            let mut state = thread.state();
            state.parent = Some(Arc::downgrade(parent));
            if state.session.is_none() {
                state.session = inherited;
            }
        }

        debug!(
            thread = %thread.id(),
            parent = ?parent.as_ref().map(|p| p.id()),
            daemon = thread.is_daemon(),
            "starting script thread"
        );

        if let Some(parent) = &parent {
            parent.leave_session();
        }
        self.stack().push(Arc::clone(thread));

        let spawned = {
            let scheduler = self.clone();
            let instance = Arc::clone(thread);
            std::thread::Builder::new()
                .name(format!(
                    "{} {}",
                    self.inner.config.thread_name_prefix,
                    thread.id().0
                ))
                .spawn(move || scheduler.run_body(instance, body))
        };

        let result = match spawned {
            Ok(_) => {
                thread.handoff.wait();
                Ok(())
            }
            Err(err) => {
                error!(thread = %thread.id(), %err, "failed to spawn script thread");
                self.rollback_start(thread, parent.as_ref());
                Err(ScriptError::Spawn(err))
            }
        };

        self.stack().pop();
        if let Some(parent) = &parent {
            parent.enter_session();
        }
        result
    }

    fn rollback_start(&self, thread: &Arc<ThreadInstance>, parent: Option<&Arc<ThreadInstance>>) {
        self.registry().retain(|t| !Arc::ptr_eq(t, thread));
        if let Some(parent) = parent {
            parent
                .state()
                .children
                .retain(|child| !Arc::ptr_eq(child, thread));
        }
        thread.set_running(false);
        let mut state = thread.state();
        state.parent = None;
        state.status = ThreadStatus::Failed;
    }

    fn run_body(&self, thread: Arc<ThreadInstance>, body: ThreadBody) {
        thread.state().os_thread = Some(std::thread::current().id());
        thread.enter_session();

        let context = ThreadContext {
            scheduler: self.clone(),
            thread: Arc::clone(&thread),
        };
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| body(context))) {
            Ok(result) => result,
            Err(payload) => Err(ScriptError::Runtime(panic_message(payload.as_ref()))),
        };

        self.terminate(&thread, outcome);
    }

    /// Termination cleanup. Runs once, on the thread's own OS thread.
    fn terminate(&self, thread: &Arc<ThreadInstance>, outcome: ScriptResult) {
        let status = match outcome {
            Ok(()) if thread.is_killed() => ThreadStatus::Killed,
            Ok(()) => ThreadStatus::Completed,
            Err(err) if err.is_interruption() => ThreadStatus::Killed,
            Err(err) if thread.should_unwind() => {
                debug!(thread = %thread.id(), %err, "suppressing failure of interrupted thread");
                ThreadStatus::Killed
            }
            Err(err) => {
                let message = err.to_string();
                error!(thread = %thread.id(), error = %message, "script thread failed");
                self.inner.sink.report_error(&message);
                ThreadStatus::Failed
            }
        };

        self.registry().retain(|t| !Arc::ptr_eq(t, thread));
        thread.leave_session();

        let parent = thread.state().parent.as_ref().and_then(|p| p.upgrade());
        if let Some(parent) = parent {
            parent
                .state()
                .children
                .retain(|child| !Arc::ptr_eq(child, thread));
        }

        let children = std::mem::take(&mut thread.state().children);
        for child in children {
            child.state().parent = None;
            if child.is_daemon() {
                debug!(thread = %thread.id(), child = %child.id(), "killing daemon child");
                child.kill();
            }
        }

        {
            let mut state = thread.state();
            state.status = status;
            state.parent = None;
        }
        thread.set_running(false);
        debug!(thread = %thread.id(), ?status, "script thread finished");
        thread.handoff.finish();
    }

    /// Hand the token back until the next [`Scheduler::advance`].
    ///
    /// Fails with [`ScriptError::NotInScriptThread`] unless called by the
    /// thread that holds the token. Returns [`ScriptError::Interrupted`] when
    /// the thread was killed or its task cancelled, either while suspended or
    /// before the call; in the latter case it returns without suspending.
    pub fn yield_now(&self) -> ScriptResult {
        let thread = self
            .calling_thread()
            .ok_or(ScriptError::NotInScriptThread)?;
        if thread.should_unwind() {
            return Err(ScriptError::Interrupted);
        }

        thread.leave_session();
        if !thread.handoff.block() || thread.should_unwind() {
            return Err(ScriptError::Interrupted);
        }
        thread.enter_session();
        Ok(())
    }

    /// Run every eligible live thread up to its next tick pass. Call once per host tick.
    ///
    /// Threads started during this pass first become eligible on the next one.
    /// A paused thread is skipped unless it was killed, so it can still unwind.
    pub fn advance(&self) {
        let snapshot = {
            let registry = self.registry();
            if registry.is_empty() {
                return;
            }
            registry.clone()
        };

        if self.calling_thread().is_some() {
            warn!("advance() called from inside a script thread; ignoring");
            return;
        }

        for thread in snapshot {
            if !thread.is_running() {
                continue;
            }
            if thread.is_paused() && !thread.is_killed() {
                continue;
            }

            self.stack().push(Arc::clone(&thread));
            let handback = thread.handoff.resume();
            self.stack().pop();
            trace!(thread = %thread.id(), ?handback, "thread handed back");
            if handback == Handback::Finished && thread.is_running() {
                warn!(thread = %thread.id(), "thread handed back for good without cleanup");
            }
        }
    }

    /// Kill every live thread and let them unwind.
    ///
    /// Threads still registered after `shutdown_passes` passes never reached a
    /// tick pass; they are left detached.
    pub fn shutdown(&self) {
        for _ in 0..self.inner.config.shutdown_passes {
            let live = self.live_instances();
            if live.is_empty() {
                return;
            }
            for thread in &live {
                thread.kill();
            }
            self.advance();
        }

        let remaining = self.thread_count();
        if remaining > 0 {
            warn!(remaining, "script threads did not unwind during shutdown");
        }
    }
}

impl TickHook for Scheduler {
    fn on_tick(&mut self, tick: SimTick) -> anyhow::Result<()> {
        trace!(%tick, threads = self.thread_count(), "advancing script threads");
        self.advance();
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("threads", &self.thread_count())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "script thread panicked".to_string()
    }
}

/// Passed to every thread body: the thread's own view of the scheduler.
pub struct ThreadContext {
    scheduler: Scheduler,
    thread: Arc<ThreadInstance>,
}

impl ThreadContext {
    /// Pass one tick. Propagate the error with `?`.
    pub fn tick(&self) -> ScriptResult {
        self.scheduler.yield_now()
    }

    /// Pass `ticks` ticks.
    pub fn ticks(&self, ticks: u32) -> ScriptResult {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(())
    }

    /// Handle to the running thread.
    pub fn handle(&self) -> ThreadHandle {
        self.scheduler.wrap(Arc::clone(&self.thread))
    }

    /// Scheduler driving this thread.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}
