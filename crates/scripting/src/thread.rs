//! State of one logical script thread.

use crate::error::ScriptResult;
use crate::handoff::Handoff;
use crate::scheduler::ThreadContext;
use crate::task::TaskToken;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tickscript_core::MovementInput;

/// Body executed on a script thread.
pub type ThreadBody = Box<dyn FnOnce(ThreadContext) -> ScriptResult + Send + 'static>;

/// Scheduler-unique thread identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Id of the sentinel handle standing in for the host's own thread.
    pub const MAIN: Self = Self(0);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle position of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    /// Built but not started.
    Created,
    /// Registered and advancing once per tick.
    Running,
    /// Body returned normally.
    Completed,
    /// Body raised an error that was reported.
    Failed,
    /// Unwound after a kill or cancellation.
    Killed,
}

impl ThreadStatus {
    /// True for the three end states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }
}

/// Interpreter state a thread must hold while its code executes.
///
/// `leave` is called before the thread gives up the token and `enter` when it
/// gets it back. Both run on the OS thread that executes the script code.
pub trait SessionContext: Send + Sync {
    /// Attach the calling OS thread to the session.
    fn enter(&self);
    /// Detach the calling OS thread from the session.
    fn leave(&self);
}

pub(crate) struct ThreadState {
    pub(crate) status: ThreadStatus,
    pub(crate) body: Option<ThreadBody>,
    pub(crate) parent: Option<Weak<ThreadInstance>>,
    pub(crate) children: Vec<Arc<ThreadInstance>>,
    pub(crate) session: Option<Arc<dyn SessionContext>>,
    pub(crate) session_entered: bool,
    pub(crate) os_thread: Option<std::thread::ThreadId>,
    pub(crate) input: MovementInput,
    pub(crate) sprinting: bool,
    pub(crate) blocking_input: bool,
}

/// One logical script thread.
///
/// Flags are atomics so that read-only observers (the input pass, handles held
/// by the host) never need the state lock.
pub struct ThreadInstance {
    id: ThreadId,
    daemon: bool,
    main: bool,
    running: AtomicBool,
    paused: AtomicBool,
    killed: AtomicBool,
    pub(crate) handoff: Handoff,
    pub(crate) task: Arc<TaskToken>,
    state: Mutex<ThreadState>,
}

impl ThreadInstance {
    pub(crate) fn new(
        id: ThreadId,
        daemon: bool,
        body: Option<ThreadBody>,
        session: Option<Arc<dyn SessionContext>>,
    ) -> Self {
        Self {
            id,
            daemon,
            main: id == ThreadId::MAIN,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            killed: AtomicBool::new(false),
            handoff: Handoff::new(),
            task: Arc::new(TaskToken::new()),
            state: Mutex::new(ThreadState {
                status: ThreadStatus::Created,
                body,
                parent: None,
                children: Vec::new(),
                session,
                session_entered: false,
                os_thread: None,
                input: MovementInput::zero(),
                sprinting: false,
                blocking_input: false,
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ThreadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    pub(crate) fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub(crate) fn is_main(&self) -> bool {
        self.main
    }

    /// Raw `running` flag: set on start, cleared by termination cleanup.
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        self.task.set_alive(running);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub(crate) fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    /// Killed, or cancelled through the task registry.
    pub(crate) fn should_unwind(&self) -> bool {
        self.is_killed() || self.task.is_completed()
    }

    pub(crate) fn status(&self) -> ThreadStatus {
        self.state().status
    }

    pub(crate) fn os_thread(&self) -> Option<std::thread::ThreadId> {
        self.state().os_thread
    }

    /// Parent, if the link is still set and the parent is still alive.
    pub(crate) fn parent(&self) -> Option<Arc<ThreadInstance>> {
        let parent = self.state().parent.as_ref()?.upgrade()?;
        if parent.is_killed() || !parent.is_running() {
            return None;
        }
        Some(parent)
    }

    pub(crate) fn children(&self) -> Vec<Arc<ThreadInstance>> {
        self.state().children.clone()
    }

    pub(crate) fn session(&self) -> Option<Arc<dyn SessionContext>> {
        self.state().session.clone()
    }

    /// Enter the session on the calling OS thread if not already entered.
    pub(crate) fn enter_session(&self) {
        let session = {
            let mut state = self.state();
            if state.session_entered {
                return;
            }
            let Some(session) = state.session.clone() else {
                return;
            };
            state.session_entered = true;
            session
        };
        session.enter();
    }

    /// Leave the session on the calling OS thread if currently entered.
    pub(crate) fn leave_session(&self) {
        let session = {
            let mut state = self.state();
            if !state.session_entered {
                return;
            }
            state.session_entered = false;
            state.session.clone()
        };
        if let Some(session) = session {
            session.leave();
        }
    }

    pub(crate) fn input(&self) -> MovementInput {
        self.state().input
    }

    pub(crate) fn update_input(&self, update: impl FnOnce(&mut MovementInput)) {
        update(&mut self.state().input);
    }

    pub(crate) fn is_sprinting(&self) -> bool {
        self.state().sprinting
    }

    pub(crate) fn set_sprinting(&self, sprinting: bool) {
        self.state().sprinting = sprinting;
    }

    pub(crate) fn is_blocking_input(&self) -> bool {
        self.state().blocking_input
    }

    pub(crate) fn set_blocking_input(&self, blocking: bool) {
        self.state().blocking_input = blocking;
    }
}

impl fmt::Debug for ThreadInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadInstance")
            .field("id", &self.id)
            .field("daemon", &self.daemon)
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("killed", &self.is_killed())
            .finish_non_exhaustive()
    }
}
