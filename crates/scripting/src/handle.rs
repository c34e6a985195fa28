//! Public handle onto a script thread.

use crate::error::{ScriptError, ScriptResult};
use crate::scheduler::{Scheduler, ThreadContext};
use crate::thread::{ThreadId, ThreadInstance, ThreadStatus};
use std::fmt;
use std::sync::Arc;
use tickscript_core::MovementInput;

/// Cloneable reference to one script thread.
///
/// Two handles compare equal when they refer to the same thread.
#[derive(Clone)]
pub struct ThreadHandle {
    scheduler: Scheduler,
    thread: Arc<ThreadInstance>,
}

impl ThreadHandle {
    pub(crate) fn from_parts(scheduler: Scheduler, thread: Arc<ThreadInstance>) -> Self {
        Self { scheduler, thread }
    }

    /// Build a daemon thread. Nothing runs until [`ThreadHandle::run`].
    pub fn create<F>(scheduler: &Scheduler, body: F) -> Self
    where
        F: FnOnce(ThreadContext) -> ScriptResult + Send + 'static,
    {
        scheduler.create(true, body)
    }

    /// Build a thread with an explicit daemon flag.
    pub fn create_with_daemon<F>(scheduler: &Scheduler, daemon: bool, body: F) -> Self
    where
        F: FnOnce(ThreadContext) -> ScriptResult + Send + 'static,
    {
        scheduler.create(daemon, body)
    }

    /// Thread executing on the calling OS thread, or the main sentinel.
    pub fn current(scheduler: &Scheduler) -> Self {
        scheduler.current_or_main()
    }

    /// Scheduler-unique id.
    pub fn id(&self) -> ThreadId {
        self.thread.id()
    }

    /// True from start until cleanup, and false as soon as the thread is killed.
    pub fn is_running(&self) -> bool {
        self.thread.is_running() && !self.thread.is_killed()
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.thread.is_paused()
    }

    /// Whether the thread dies with its parent.
    pub fn is_daemon(&self) -> bool {
        self.thread.is_daemon()
    }

    /// True once killed, even before the thread has unwound.
    pub fn is_killed(&self) -> bool {
        self.thread.is_killed()
    }

    /// True for the sentinel standing in for the host's own thread.
    pub fn is_main(&self) -> bool {
        self.thread.is_main()
    }

    /// Lifecycle position.
    pub fn status(&self) -> ThreadStatus {
        self.thread.status()
    }

    /// Parent that started this thread, while that parent is alive.
    pub fn parent(&self) -> Option<ThreadHandle> {
        self.thread
            .parent()
            .map(|parent| self.scheduler.wrap(parent))
    }

    /// Threads this one started that are still attached, in start order.
    pub fn children(&self) -> Vec<ThreadHandle> {
        self.thread
            .children()
            .into_iter()
            .map(|child| self.scheduler.wrap(child))
            .collect()
    }

    /// Start the thread.
    ///
    /// The body runs synchronously until its first tick pass or until it
    /// finishes; only then does this return. Started from inside another
    /// thread, the new thread becomes that thread's child.
    ///
    /// Starting a running thread is a no-op; restarting a finished one fails
    /// with [`ScriptError::AlreadyFinished`]. A thread killed before it was
    /// started is marked finished without running its body.
    pub fn run(&self) -> ScriptResult {
        self.scheduler.start(&self.thread)
    }

    /// Skip this thread in subsequent tick passes.
    pub fn pause(&self) {
        self.thread.set_paused(true);
    }

    /// Resume tick passes.
    pub fn unpause(&self) {
        self.thread.set_paused(false);
    }

    /// Make the thread unwind at its next tick pass. Idempotent.
    pub fn kill(&self) {
        self.thread.kill();
    }

    /// Tick until this thread is no longer running.
    ///
    /// A killed thread counts as running until it has unwound, so `kill`
    /// followed by `wait_for` returns once the thread is out of the registry.
    /// Returns immediately when the thread is not running. From the host's own
    /// thread (outside any script thread) this fails with
    /// [`ScriptError::NotInScriptThread`] unless the thread already stopped.
    pub fn wait_for(&self) -> ScriptResult {
        if let Some(caller) = self.scheduler.calling_thread() {
            if Arc::ptr_eq(&caller, &self.thread) {
                return Err(ScriptError::WaitOnSelf);
            }
        }
        while self.thread.is_running() {
            self.scheduler.yield_now()?;
        }
        Ok(())
    }

    /// Replace the movement keys this thread holds down.
    pub fn set_input(&self, input: MovementInput) {
        self.thread.update_input(|current| *current = input);
    }

    /// Edit the movement keys this thread holds down.
    pub fn update_input(&self, update: impl FnOnce(&mut MovementInput)) {
        self.thread.update_input(update);
    }

    /// Movement keys this thread holds down.
    pub fn input(&self) -> MovementInput {
        self.thread.input()
    }

    /// Request sprinting while this thread is alive.
    pub fn set_sprinting(&self, sprinting: bool) {
        self.thread.set_sprinting(sprinting);
    }

    /// Sprint request.
    pub fn is_sprinting(&self) -> bool {
        self.thread.is_sprinting()
    }

    /// Suppress the real player's keys while this thread is alive.
    pub fn set_blocking_input(&self, blocking: bool) {
        self.thread.set_blocking_input(blocking);
    }

    /// Whether the real player's keys are suppressed by this thread.
    pub fn is_blocking_input(&self) -> bool {
        self.thread.is_blocking_input()
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.thread, &other.thread)
    }
}

impl Eq for ThreadHandle {}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadHandle").field(&self.thread).finish()
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread {}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_outside_scripts_is_main() {
        let scheduler = Scheduler::default();
        let main = ThreadHandle::current(&scheduler);
        assert!(main.is_main());
        assert_eq!(main.id(), ThreadId::MAIN);
        assert!(!main.is_running());
        assert_eq!(main, ThreadHandle::current(&scheduler));
        assert!(main.run().is_ok());
        assert!(scheduler.is_idle());
    }

    #[test]
    fn current_inside_body_is_self() {
        let scheduler = Scheduler::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = ThreadHandle::create(&scheduler, move |ctx| {
            let current = ThreadHandle::current(ctx.scheduler());
            let _ = tx.send(current == ctx.handle() && !current.is_main());
            Ok(())
        });
        thread.run().expect("start");
        assert_eq!(rx.try_recv(), Ok(true));
    }

    #[test]
    fn killed_before_start_never_runs_body() {
        let scheduler = Scheduler::default();
        let (tx, rx) = crossbeam_channel::unbounded::<()>();
        let thread = ThreadHandle::create(&scheduler, move |_ctx| {
            let _ = tx.send(());
            Ok(())
        });
        thread.kill();
        thread.run().expect("run after kill");
        assert!(rx.try_recv().is_err());
        assert_eq!(thread.status(), ThreadStatus::Killed);
        assert!(scheduler.is_idle());
    }

    #[test]
    fn restarting_finished_thread_fails() {
        let scheduler = Scheduler::default();
        let thread = ThreadHandle::create(&scheduler, |_ctx| Ok(()));
        thread.run().expect("first run");
        assert!(matches!(
            thread.run(),
            Err(ScriptError::AlreadyFinished(_))
        ));
    }

    #[test]
    fn running_thread_restart_is_no_op() {
        let scheduler = Scheduler::default();
        let thread = ThreadHandle::create(&scheduler, |ctx| loop {
            ctx.tick()?;
        });
        thread.run().expect("start");
        thread.run().expect("second run");
        assert_eq!(scheduler.thread_count(), 1);
        scheduler.shutdown();
    }

    #[test]
    fn kill_hides_running_immediately() {
        let scheduler = Scheduler::default();
        let thread = ThreadHandle::create(&scheduler, |ctx| loop {
            ctx.tick()?;
        });
        thread.run().expect("start");
        thread.kill();
        assert!(!thread.is_running());
        assert!(thread.is_killed());
        // still registered until it unwinds
        assert_eq!(scheduler.thread_count(), 1);
        scheduler.advance();
        assert!(scheduler.is_idle());
    }

    #[test]
    fn paused_thread_is_skipped() {
        let scheduler = Scheduler::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = ThreadHandle::create(&scheduler, move |ctx| {
            let mut passes = 0u32;
            loop {
                ctx.tick()?;
                passes += 1;
                let _ = tx.send(passes);
            }
        });
        thread.run().expect("start");
        thread.pause();
        scheduler.advance();
        assert!(rx.try_recv().is_err());
        thread.unpause();
        scheduler.advance();
        assert_eq!(rx.try_recv(), Ok(1));
        scheduler.shutdown();
    }

    #[test]
    fn wait_for_stopped_thread_returns_immediately() {
        let scheduler = Scheduler::default();
        let idle = ThreadHandle::create(&scheduler, |_ctx| Ok(()));
        assert!(idle.wait_for().is_ok());
        idle.run().expect("start");
        assert!(idle.wait_for().is_ok());
    }

    #[test]
    fn wait_for_self_is_rejected() {
        let scheduler = Scheduler::default();
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = ThreadHandle::create(&scheduler, move |ctx| {
            let result = ctx.handle().wait_for();
            let _ = tx.send(matches!(result, Err(ScriptError::WaitOnSelf)));
            Ok(())
        });
        thread.run().expect("start");
        assert_eq!(rx.try_recv(), Ok(true));
    }

    #[test]
    fn input_accessors_round_trip() {
        let scheduler = Scheduler::default();
        let thread = ThreadHandle::create(&scheduler, |_ctx| Ok(()));
        thread.update_input(|input| input.pressing_forward = true);
        thread.set_sprinting(true);
        thread.set_blocking_input(true);
        assert!(thread.input().pressing_forward);
        assert!(thread.is_sprinting());
        assert!(thread.is_blocking_input());
        assert_eq!(thread.to_string(), format!("Thread {}", thread.id()));
    }
}
