//! Rhai front end: compiles script sources and runs them as script threads.

use crate::error::ScriptError;
use crate::handle::ThreadHandle;
use crate::library;
use crate::scheduler::Scheduler;
use crate::thread::SessionContext;
use anyhow::{Context, Result};
use rhai::{Dynamic, Engine, EvalAltResult, Position, AST};
use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Services scripts reach outside the scheduler.
pub trait ScriptHost: Send + Sync {
    /// Output of `print`.
    fn print(&self, message: &str);
    /// Send a chat message.
    fn chat(&self, message: &str) -> anyhow::Result<()>;
    /// Execute a host command and return its feedback.
    fn exec(&self, command: &str) -> anyhow::Result<String>;
    /// Whether a player session exists.
    fn is_logged_in(&self) -> bool {
        true
    }
}

/// Compiled script plus the engine that runs it.
pub struct Program {
    name: String,
    engine: Arc<Engine>,
    ast: AST,
}

impl Program {
    /// Name the program was compiled under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, body: &rhai::FnPtr) -> Result<Dynamic, Box<EvalAltResult>> {
        body.call::<Dynamic>(&self.engine, &self.ast, ())
    }

    fn run(&self) -> Result<(), Box<EvalAltResult>> {
        self.engine.run_ast(&self.ast)
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// Program whose code is executing on this OS thread.
thread_local! {
    static ACTIVE_PROGRAM: RefCell<Option<Arc<Program>>> = const { RefCell::new(None) };
}

/// Program active on the calling OS thread, if a script thread holds the token here.
pub(crate) fn active_program() -> Option<Arc<Program>> {
    ACTIVE_PROGRAM.with(|active| active.borrow().clone())
}

/// Publishes a program to [`active_program`] while its thread executes.
pub(crate) struct ProgramSession {
    program: Arc<Program>,
}

impl ProgramSession {
    pub(crate) fn new(program: Arc<Program>) -> Arc<dyn SessionContext> {
        Arc::new(Self { program })
    }
}

impl SessionContext for ProgramSession {
    fn enter(&self) {
        ACTIVE_PROGRAM.with(|active| {
            *active.borrow_mut() = Some(Arc::clone(&self.program));
        });
    }

    fn leave(&self) {
        ACTIVE_PROGRAM.with(|active| active.borrow_mut().take());
    }
}

/// Map a scheduler error onto the Rhai error that carries it through script code.
///
/// Interruption becomes [`EvalAltResult::ErrorTerminated`], which `try`/`catch`
/// cannot intercept.
pub(crate) fn to_rhai(err: ScriptError) -> Box<EvalAltResult> {
    match err {
        ScriptError::Interrupted => {
            EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE).into()
        }
        other => EvalAltResult::ErrorRuntime(other.to_string().into(), Position::NONE).into(),
    }
}

/// Inverse of [`to_rhai`], seeing through function-call wrappers.
pub(crate) fn into_script_error(err: Box<EvalAltResult>) -> ScriptError {
    if is_terminated(&err) {
        ScriptError::Interrupted
    } else {
        ScriptError::Runtime(err.to_string())
    }
}

fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, ..) => is_terminated(inner),
        EvalAltResult::ErrorInModule(_, inner, ..) => is_terminated(inner),
        _ => false,
    }
}

/// Compiles sources and runs each as a root script thread.
pub struct ScriptEngine {
    scheduler: Scheduler,
    engine: Arc<Engine>,
}

impl ScriptEngine {
    /// Build an engine whose builtins drive `scheduler` and talk to `host`.
    pub fn new(scheduler: Scheduler, host: Arc<dyn ScriptHost>) -> Self {
        let mut engine = Engine::new();
        library::register(&mut engine, &scheduler, host);
        Self {
            scheduler,
            engine: Arc::new(engine),
        }
    }

    /// Scheduler the engine's threads run on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Compile `source` without running it.
    pub fn compile(&self, name: &str, source: &str) -> Result<Arc<Program>> {
        let ast = self
            .engine
            .compile(source)
            .with_context(|| format!("failed to compile script `{name}`"))?;
        Ok(Arc::new(Program {
            name: name.to_string(),
            engine: Arc::clone(&self.engine),
            ast,
        }))
    }

    /// Compile `source` and start it as a non-daemon root thread.
    ///
    /// Returns once the script first passes a tick or finishes. Failures
    /// raised by the script itself go to the scheduler's error sink, not to
    /// the caller.
    pub fn execute(&self, name: &str, source: &str) -> Result<ThreadHandle> {
        let program = self.compile(name, source)?;
        let body_program = Arc::clone(&program);
        let thread = self.scheduler.create_with_session(
            false,
            ProgramSession::new(program),
            move |_ctx| body_program.run().map_err(into_script_error),
        );
        debug!(script = name, thread = %thread.id(), "executing script");
        thread
            .run()
            .with_context(|| format!("failed to start script `{name}`"))?;
        Ok(thread)
    }

    /// Read and execute a script file.
    pub fn execute_file(&self, path: &Path) -> Result<ThreadHandle> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read script {}", path.display()))?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        info!(script = %name, path = %path.display(), "executing script file");
        self.execute(&name, &source)
    }
}

impl std::fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}
