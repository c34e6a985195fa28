//! Builtins registered on every script engine.

use crate::engine::{active_program, into_script_error, to_rhai, ProgramSession, ScriptHost};
use crate::error::ScriptError;
use crate::handle::ThreadHandle;
use crate::scheduler::Scheduler;
use rhai::{Array, Dynamic, Engine, EvalAltResult, FnPtr, Position, Scope};
use std::sync::Arc;
use tickscript_core::MovementInput;

type RhaiResult<T = ()> = Result<T, Box<EvalAltResult>>;

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    let message: String = message.into();
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

pub(crate) fn register(engine: &mut Engine, scheduler: &Scheduler, host: Arc<dyn ScriptHost>) {
    register_host(engine, host);
    register_ticks(engine, scheduler);
    register_threads(engine, scheduler);
    register_input(engine, scheduler);
}

fn register_host(engine: &mut Engine, host: Arc<dyn ScriptHost>) {
    let printer = Arc::clone(&host);
    engine.on_print(move |text| printer.print(text));
    engine.on_debug(|text, source, pos| {
        tracing::debug!(source = source.unwrap_or("script"), %pos, "{text}");
    });

    let chat = Arc::clone(&host);
    engine.register_fn("chat", move |message: &str| -> RhaiResult {
        chat.chat(message).map_err(|err| runtime_error(format!("{err:#}")))
    });

    let exec = Arc::clone(&host);
    engine.register_fn("exec", move |command: &str| -> RhaiResult<String> {
        exec.exec(command)
            .map_err(|err| runtime_error(format!("{err:#}")))
    });

    engine.register_fn("is_logged_in", move || host.is_logged_in());
}

fn register_ticks(engine: &mut Engine, scheduler: &Scheduler) {
    let single = scheduler.clone();
    engine.register_fn("tick", move || -> RhaiResult {
        single.yield_now().map_err(to_rhai)
    });

    let many = scheduler.clone();
    engine.register_fn("tick", move |ticks: i64| -> RhaiResult {
        for _ in 0..ticks.max(0) {
            many.yield_now().map_err(to_rhai)?;
        }
        Ok(())
    });
}

fn spawn_thread(scheduler: &Scheduler, body: FnPtr, daemon: bool) -> RhaiResult<ThreadHandle> {
    let program =
        active_program().ok_or_else(|| to_rhai(ScriptError::NotInScriptThread))?;
    let body_program = Arc::clone(&program);
    Ok(scheduler.create_with_session(daemon, ProgramSession::new(program), move |_ctx| {
        body_program
            .call(&body)
            .map(|_| ())
            .map_err(into_script_error)
    }))
}

/// A variable captured by a closure is a shared cell, and Rhai write-locks it
/// for the whole of a method call. `run` and `wait_for` suspend inside that
/// call, so captured handles resolve to a detached copy and no lock is held
/// across a tick.
fn captured_handle(scope: &Scope, name: &str, index: usize) -> Option<Dynamic> {
    let found = if index > 0 {
        scope
            .len()
            .checked_sub(index)
            .and_then(|position| scope.iter_raw().nth(position))
            .map(|(_, _, value)| value)
    } else {
        scope.get(name)
    };
    let value = found?;
    if !value.is_shared() {
        return None;
    }
    let handle = value.read_lock::<ThreadHandle>()?;
    Some(Dynamic::from(ThreadHandle::clone(&handle)))
}

fn register_threads(engine: &mut Engine, scheduler: &Scheduler) {
    engine.register_type_with_name::<ThreadHandle>("Thread");
    engine.on_var(|name, index, ctx| Ok(captured_handle(ctx.scope(), name, index)));

    let daemon = scheduler.clone();
    engine.register_fn("create_thread", move |body: FnPtr| {
        spawn_thread(&daemon, body, true)
    });
    let explicit = scheduler.clone();
    engine.register_fn("create_thread", move |body: FnPtr, is_daemon: bool| {
        spawn_thread(&explicit, body, is_daemon)
    });
    let current = scheduler.clone();
    engine.register_fn("current_thread", move || current.current_or_main());

    engine.register_fn("run", |thread: ThreadHandle| -> RhaiResult {
        thread.run().map_err(to_rhai)
    });
    engine.register_fn("pause", |thread: &mut ThreadHandle| thread.pause());
    engine.register_fn("unpause", |thread: &mut ThreadHandle| thread.unpause());
    engine.register_fn("kill", |thread: &mut ThreadHandle| thread.kill());
    engine.register_fn("wait_for", |thread: ThreadHandle| -> RhaiResult {
        thread.wait_for().map_err(to_rhai)
    });

    engine.register_get("id", |thread: &mut ThreadHandle| thread.id().0 as i64);
    engine.register_get("running", |thread: &mut ThreadHandle| thread.is_running());
    engine.register_get("paused", |thread: &mut ThreadHandle| thread.is_paused());
    engine.register_get("daemon", |thread: &mut ThreadHandle| thread.is_daemon());
    engine.register_get("parent", |thread: &mut ThreadHandle| {
        thread
            .parent()
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_get("children", |thread: &mut ThreadHandle| -> Array {
        thread.children().into_iter().map(Dynamic::from).collect()
    });

    engine.register_fn("to_string", |thread: &mut ThreadHandle| thread.to_string());
    engine.register_fn("to_debug", |thread: &mut ThreadHandle| format!("{thread:?}"));
    engine.register_fn("==", |a: &mut ThreadHandle, b: ThreadHandle| *a == b);
    engine.register_fn("!=", |a: &mut ThreadHandle, b: ThreadHandle| *a != b);
}

fn input_flag<'a>(input: &'a mut MovementInput, key: &str) -> RhaiResult<&'a mut bool> {
    match key {
        "forward" => Ok(&mut input.pressing_forward),
        "back" => Ok(&mut input.pressing_back),
        "left" => Ok(&mut input.pressing_left),
        "right" => Ok(&mut input.pressing_right),
        "jump" => Ok(&mut input.jumping),
        "sneak" => Ok(&mut input.sneaking),
        other => Err(runtime_error(format!(
            "unknown input key `{other}` (expected forward, back, left, right, jump or sneak)"
        ))),
    }
}

fn register_input(engine: &mut Engine, scheduler: &Scheduler) {
    let setter = scheduler.clone();
    engine.register_fn("set_input", move |key: &str, pressed: bool| -> RhaiResult {
        let thread = current_script(&setter)?;
        let mut input = thread.input();
        *input_flag(&mut input, key)? = pressed;
        thread.set_input(input);
        Ok(())
    });

    let getter = scheduler.clone();
    engine.register_fn("get_input", move |key: &str| -> RhaiResult<bool> {
        let mut input = current_script(&getter)?.input();
        Ok(*input_flag(&mut input, key)?)
    });

    let sprint = scheduler.clone();
    engine.register_fn("set_sprinting", move |sprinting: bool| -> RhaiResult {
        current_script(&sprint)?.set_sprinting(sprinting);
        Ok(())
    });

    let sprint_query = scheduler.clone();
    engine.register_fn("is_sprinting", move || -> RhaiResult<bool> {
        Ok(current_script(&sprint_query)?.is_sprinting())
    });

    let block = scheduler.clone();
    engine.register_fn("block_input", move |blocking: bool| -> RhaiResult {
        current_script(&block)?.set_blocking_input(blocking);
        Ok(())
    });

    let block_query = scheduler.clone();
    engine.register_fn("is_blocking_input", move || -> RhaiResult<bool> {
        Ok(current_script(&block_query)?.is_blocking_input())
    });
}

fn current_script(scheduler: &Scheduler) -> RhaiResult<ThreadHandle> {
    scheduler
        .current()
        .ok_or_else(|| to_rhai(ScriptError::NotInScriptThread))
}
