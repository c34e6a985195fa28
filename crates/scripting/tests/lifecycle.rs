//! Thread lifecycle scenarios driven through the public API.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tickscript_scripting::{
    CollectingSink, InMemoryTaskRegistry, Scheduler, SchedulerConfig, ScriptError, ScriptResult,
    ThreadHandle, ThreadStatus,
};

fn scheduler() -> (Scheduler, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let scheduler = Scheduler::new(
        SchedulerConfig::default(),
        Arc::new(InMemoryTaskRegistry::new()),
        sink.clone(),
    );
    (scheduler, sink)
}

fn looping(scheduler: &Scheduler, daemon: bool) -> ThreadHandle {
    ThreadHandle::create_with_daemon(scheduler, daemon, |ctx| loop {
        ctx.tick()?;
    })
}

#[test]
fn registry_holds_exactly_the_running_threads() {
    let (scheduler, _) = scheduler();
    let a = looping(&scheduler, false);
    let b = ThreadHandle::create_with_daemon(&scheduler, false, |ctx| ctx.ticks(2));
    assert!(scheduler.is_idle());

    a.run().expect("start a");
    b.run().expect("start b");
    assert_eq!(scheduler.live_threads(), vec![a.clone(), b.clone()]);

    for _ in 0..2 {
        scheduler.advance();
        for live in scheduler.live_threads() {
            assert!(live.is_running());
        }
    }
    assert_eq!(scheduler.live_threads(), vec![a.clone()]);
    assert!(!b.is_running());

    scheduler.shutdown();
    assert!(scheduler.live_threads().is_empty());
}

#[test]
fn kill_stops_thread_and_cleans_up_once() {
    let (scheduler, _) = scheduler();
    let cleanups = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&cleanups);
    let thread = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        let result = (|| -> ScriptResult {
            loop {
                ctx.tick()?;
            }
        })();
        counter.fetch_add(1, Ordering::SeqCst);
        result
    });
    thread.run().expect("start");

    thread.kill();
    thread.kill();
    scheduler.advance();
    scheduler.advance();

    assert!(!thread.is_running());
    assert_eq!(thread.status(), ThreadStatus::Killed);
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn daemon_children_die_and_others_are_orphaned() {
    let (scheduler, _) = scheduler();
    let spawned = Arc::new(std::sync::Mutex::new(Vec::new()));
    let record = Arc::clone(&spawned);
    let parent = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        let daemon = looping(ctx.scheduler(), true);
        let worker = looping(ctx.scheduler(), false);
        daemon.run()?;
        worker.run()?;
        assert_eq!(ctx.handle().children(), vec![daemon.clone(), worker.clone()]);
        assert_eq!(worker.parent(), Some(ctx.handle()));
        record.lock().unwrap().extend([daemon, worker]);
        ctx.tick()
    });
    parent.run().expect("start parent");
    assert_eq!(scheduler.thread_count(), 3);

    scheduler.advance();
    let children = spawned.lock().unwrap().clone();
    let (daemon, worker) = (&children[0], &children[1]);

    assert!(!parent.is_running());
    assert!(!daemon.is_running());
    assert!(worker.is_running());
    assert_eq!(worker.parent(), None);
    assert_eq!(scheduler.live_threads(), vec![worker.clone()]);

    scheduler.shutdown();
}

#[test]
fn synchronous_child_survives_finished_parent() {
    let (scheduler, _) = scheduler();
    let steps = Arc::new(AtomicU32::new(0));
    let child_steps = Arc::clone(&steps);
    let parent = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        let child = ThreadHandle::create_with_daemon(ctx.scheduler(), false, move |ctx| loop {
            child_steps.fetch_add(1, Ordering::SeqCst);
            ctx.tick()?;
        });
        child.run()
    });
    parent.run().expect("start parent");

    assert!(!parent.is_running());
    assert_eq!(steps.load(Ordering::SeqCst), 1);
    let child = scheduler.live_threads().pop().expect("child alive");
    assert!(child.parent().is_none());

    scheduler.advance();
    assert_eq!(steps.load(Ordering::SeqCst), 2);
    scheduler.shutdown();
}

#[test]
fn threads_started_during_advance_wait_for_next_pass() {
    let (scheduler, _) = scheduler();
    let steps = Arc::new(AtomicU32::new(0));
    let child_steps = Arc::clone(&steps);
    let parent = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        ctx.tick()?;
        let child = ThreadHandle::create_with_daemon(ctx.scheduler(), false, move |ctx| loop {
            child_steps.fetch_add(1, Ordering::SeqCst);
            ctx.tick()?;
        });
        child.run()?;
        loop {
            ctx.tick()?;
        }
    });
    parent.run().expect("start parent");

    scheduler.advance();
    // ran synchronously up to its first tick, but not resumed in the same pass
    assert_eq!(steps.load(Ordering::SeqCst), 1);
    scheduler.advance();
    assert_eq!(steps.load(Ordering::SeqCst), 2);
    scheduler.shutdown();
}

#[test]
fn wait_for_rules() {
    let (scheduler, _) = scheduler();
    let finished = ThreadHandle::create(&scheduler, |_ctx| Ok(()));
    finished.run().expect("start");
    assert!(finished.wait_for().is_ok());

    let outcome = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&outcome);
    let thread = ThreadHandle::create(&scheduler, move |ctx| {
        *slot.lock().unwrap() = Some(ctx.handle().wait_for());
        Ok(())
    });
    thread.run().expect("start");
    assert!(matches!(
        outcome.lock().unwrap().take(),
        Some(Err(ScriptError::WaitOnSelf))
    ));
}

#[test]
fn wait_for_after_kill_returns_once_the_thread_unwound() {
    let (scheduler, _) = scheduler();
    let observed = Arc::new(std::sync::Mutex::new(None));
    let slot = Arc::clone(&observed);
    let waiter = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        let child = looping(ctx.scheduler(), false);
        child.run()?;
        child.kill();
        child.wait_for()?;
        *slot.lock().unwrap() = Some((
            child.status(),
            ctx.scheduler().thread_count(),
            ctx.handle().children().len(),
        ));
        Ok(())
    });
    waiter.run().expect("start");
    assert!(observed.lock().unwrap().is_none());

    // the child unwinds after the waiter's slice, so the waiter sees it gone next pass
    scheduler.advance();
    assert!(observed.lock().unwrap().is_none());
    scheduler.advance();
    assert_eq!(
        observed.lock().unwrap().take(),
        Some((ThreadStatus::Killed, 1, 0))
    );
    assert!(scheduler.is_idle());
}

#[test]
fn wait_for_on_stopped_thread_does_not_tick() {
    let (scheduler, _) = scheduler();
    let finished = ThreadHandle::create(&scheduler, |_ctx| Ok(()));
    finished.run().expect("start");
    let never_started = ThreadHandle::create(&scheduler, |_ctx| Ok(()));

    let steps = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&steps);
    let waiter = ThreadHandle::create_with_daemon(&scheduler, false, move |ctx| {
        counter.fetch_add(1, Ordering::SeqCst);
        finished.wait_for()?;
        never_started.wait_for()?;
        counter.fetch_add(1, Ordering::SeqCst);
        ctx.tick()?;
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    waiter.run().expect("start");
    assert_eq!(steps.load(Ordering::SeqCst), 2);
    assert!(waiter.is_running());

    scheduler.advance();
    assert_eq!(steps.load(Ordering::SeqCst), 3);
    assert!(scheduler.is_idle());
}

#[test]
fn blocking_input_ends_with_its_thread() {
    let (scheduler, _) = scheduler();
    let thread = ThreadHandle::create_with_daemon(&scheduler, false, |ctx| {
        ctx.handle().set_blocking_input(true);
        ctx.tick()
    });
    thread.run().expect("start");
    assert!(scheduler.input().blocking_input());

    scheduler.advance();
    assert!(!thread.is_running());
    assert!(!scheduler.input().blocking_input());
}

#[test]
fn failing_thread_reports_and_still_cleans_up() {
    let (scheduler, sink) = scheduler();
    let parent = ThreadHandle::create_with_daemon(&scheduler, false, |ctx| {
        looping(ctx.scheduler(), true).run()?;
        ctx.tick()?;
        Err(ScriptError::runtime("lost track of the target"))
    });
    parent.run().expect("start");
    scheduler.advance();
    scheduler.advance();

    assert_eq!(parent.status(), ThreadStatus::Failed);
    assert_eq!(sink.messages(), vec!["lost track of the target".to_string()]);
    assert!(scheduler.is_idle());
}
