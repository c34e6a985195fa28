use crate::chat::{ChatKind, ChatLine, ChatLog};
use crate::command_script::CommandSchedule;
use crate::commands::{execute_command, parse_command, CommandContext, CommandError, CommandOutput};
use crate::config::ScriptingConfig;
use crate::scripted_input::{PlayerKeys, ScriptedInputPlayer};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tickscript_core::{MovementInput, SimTick};
use tickscript_scripting::{
    InMemoryTaskRegistry, Scheduler, ScriptEngine, ScriptHost, ThreadHandle, TickHook,
};
use tickscript_testkit::{EventRecord, JsonlSink};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// State shared by the tick loop, the command dispatcher and running scripts.
pub struct HostShared {
    config: ScriptingConfig,
    chat: Arc<ChatLog>,
    tasks: Arc<InMemoryTaskRegistry>,
    engine: ScriptEngine,
    scripts: Mutex<BTreeMap<String, String>>,
}

impl HostShared {
    pub fn new(config: ScriptingConfig) -> Arc<Self> {
        let chat = Arc::new(ChatLog::new());
        let tasks = Arc::new(InMemoryTaskRegistry::new());
        let scheduler = Scheduler::new(config.scheduler.clone(), tasks.clone(), chat.clone());
        Arc::new_cyclic(|shared| Self {
            engine: ScriptEngine::new(
                scheduler,
                Arc::new(HostBridge {
                    shared: shared.clone(),
                }),
            ),
            config,
            chat,
            tasks,
            scripts: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.engine.scheduler()
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn tasks(&self) -> &InMemoryTaskRegistry {
        &self.tasks
    }

    fn scripts(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.scripts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dispatch(&self, input: &str) -> Result<CommandOutput, CommandError> {
        let cmd = parse_command(input)?;
        debug!(?cmd, "dispatching command");
        Ok(execute_command(self, cmd))
    }

    /// Dispatch `input` and post the feedback to chat.
    pub fn dispatch_to_chat(&self, input: &str) {
        match self.dispatch(input) {
            Ok(out) => {
                for line in out.lines {
                    self.chat.push(ChatKind::Feedback, line);
                }
            }
            Err(err) => self.chat.push(ChatKind::Error, err.to_string()),
        }
    }
}

impl CommandContext for HostShared {
    fn reload_scripts(&self) -> Result<usize> {
        let root = &self.config.scripts_dir;
        if !root.is_dir() {
            anyhow::bail!("Scripts directory not found: {}", root.display());
        }

        let mut loaded = BTreeMap::new();
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let name = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = fs::read_to_string(entry.path())
                .with_context(|| format!("failed to read {}", entry.path().display()))?;
            loaded.insert(name, source);
        }

        let count = loaded.len();
        *self.scripts() = loaded;
        info!(count, dir = %root.display(), "reloaded scripts");
        Ok(count)
    }

    fn script_names(&self) -> Vec<String> {
        self.scripts().keys().cloned().collect()
    }

    fn run_script(&self, name: &str) -> Result<ThreadHandle> {
        // Released before executing: the script may reload or list scripts itself.
        let source = self.scripts().get(name).cloned();
        let Some(source) = source else {
            anyhow::bail!("Script not found: {name}");
        };
        self.engine.execute(name, &source)
    }

    fn exec_macro(&self, file: &str) -> Result<ThreadHandle> {
        let path = self.config.macro_dir.join(file);
        if !path.is_file() {
            anyhow::bail!("Macro file not found: {}", path.display());
        }
        self.engine.execute_file(&path)
    }

    fn task_summary(&self) -> Vec<(String, usize)> {
        self.tasks.summary()
    }

    fn stop_all_tasks(&self) -> usize {
        self.tasks.abort_all()
    }

    fn live_threads(&self) -> Vec<ThreadHandle> {
        self.scheduler().live_threads()
    }
}

/// Script-facing view of the host. Weak so the engine does not keep the host alive.
struct HostBridge {
    shared: Weak<HostShared>,
}

impl HostBridge {
    fn shared(&self) -> Result<Arc<HostShared>> {
        self.shared
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("host has shut down"))
    }
}

impl ScriptHost for HostBridge {
    fn print(&self, message: &str) {
        match self.shared.upgrade() {
            Some(shared) => shared.chat.push(ChatKind::Print, message),
            None => debug!(%message, "print after host shutdown"),
        }
    }

    fn chat(&self, message: &str) -> Result<()> {
        self.shared()?.chat.push(ChatKind::Chat, message);
        Ok(())
    }

    fn exec(&self, command: &str) -> Result<String> {
        let out = self.shared()?.dispatch(command)?;
        Ok(out.lines.join("\n"))
    }
}

#[derive(Debug, Default, Clone)]
pub struct HostOptions {
    pub max_ticks: Option<u64>,
    pub exit_when_idle: bool,
    pub realtime: bool,
    pub exec: Option<String>,
    pub command_schedule: Option<PathBuf>,
    pub scripted_input: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
}

/// Player state after the input passes of the last tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PlayerState {
    pub movement: MovementInput,
    pub sprinting: bool,
    pub items_used: u64,
    pub item_uses_blocked: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub threads_left: usize,
}

/// Fixed-rate tick loop without a window.
pub struct HeadlessHost {
    shared: Arc<HostShared>,
    scheduler: Scheduler,
    options: HostOptions,
    tick: SimTick,
    schedule: Option<CommandSchedule>,
    input: Option<ScriptedInputPlayer>,
    events: Option<JsonlSink>,
    player: PlayerState,
}

impl HeadlessHost {
    pub fn new(config: ScriptingConfig, options: HostOptions) -> Result<Self> {
        let schedule = options
            .command_schedule
            .as_deref()
            .map(CommandSchedule::from_path)
            .transpose()?;
        let input = options
            .scripted_input
            .as_deref()
            .map(ScriptedInputPlayer::from_path)
            .transpose()?;
        let events = options
            .event_log
            .as_deref()
            .map(JsonlSink::create)
            .transpose()?;
        let shared = HostShared::new(config);
        Ok(Self {
            scheduler: shared.scheduler().clone(),
            shared,
            options,
            tick: SimTick::ZERO,
            schedule,
            input,
            events,
            player: PlayerState::default(),
        })
    }

    pub fn shared(&self) -> &Arc<HostShared> {
        &self.shared
    }

    pub fn player(&self) -> PlayerState {
        self.player
    }

    pub fn tick(&self) -> SimTick {
        self.tick
    }

    /// Load scripts and run the `--exec` macro. Everything here happens at tick 0.
    pub fn startup(&mut self) -> Result<()> {
        if self.shared.config.scripts_dir.is_dir() {
            self.dispatch("/cscript reload")?;
        } else {
            debug!(
                dir = %self.shared.config.scripts_dir.display(),
                "no scripts directory; skipping initial reload"
            );
        }
        if let Some(file) = self.options.exec.clone() {
            self.dispatch(&format!("/cscript exec {file}"))?;
        }
        self.flush_chat()
    }

    fn dispatch(&mut self, command: &str) -> Result<()> {
        if let Some(events) = self.events.as_mut() {
            events.write(&EventRecord {
                tick: self.tick,
                kind: "command",
                payload: command,
            })?;
        }
        self.shared.dispatch_to_chat(command);
        Ok(())
    }

    /// Run one tick.
    pub fn step(&mut self) -> Result<()> {
        self.tick = self.tick.advance(1);

        let due = self
            .schedule
            .as_mut()
            .map(|schedule| schedule.drain_due(self.tick))
            .unwrap_or_default();
        for command in due {
            self.dispatch(&command)?;
        }

        self.scheduler.on_tick(self.tick)?;
        let pruned = self.shared.tasks.prune();
        if pruned > 0 {
            debug!(tick = %self.tick, pruned, "pruned finished tasks");
        }

        let keys = self
            .input
            .as_mut()
            .map(ScriptedInputPlayer::next_tick)
            .unwrap_or_default();
        self.input_pass(keys);

        self.flush_chat()
    }

    fn input_pass(&mut self, keys: PlayerKeys) {
        let aggregator = self.scheduler.input();

        let mut movement = keys.movement;
        aggregator.apply(&mut movement, false);
        self.player.movement = movement;
        self.player.sprinting = aggregator.effective_sprint(keys.sprint);

        if keys.use_item {
            if aggregator.blocking_input() {
                self.player.item_uses_blocked += 1;
            } else {
                self.player.items_used += 1;
            }
        }
    }

    fn flush_chat(&mut self) -> Result<()> {
        let lines = self.shared.chat.drain();
        if let Some(events) = self.events.as_mut() {
            for ChatLine { kind, text } in &lines {
                events.write(&EventRecord {
                    tick: self.tick,
                    kind: kind.as_str(),
                    payload: text,
                })?;
            }
            events.flush()?;
        }
        Ok(())
    }

    fn is_idle(&self) -> bool {
        self.scheduler.is_idle()
            && self
                .schedule
                .as_ref()
                .map_or(true, CommandSchedule::is_finished)
    }

    /// Tick until `max_ticks`, or until idle with `exit_when_idle`, then shut scripts down.
    pub fn run(&mut self) -> Result<RunSummary> {
        let tick_duration = self.shared.config.tick_duration();
        info!(
            tick_rate = self.shared.config.tick_rate,
            max_ticks = ?self.options.max_ticks,
            "headless host running"
        );

        let mut ticks = 0u64;
        loop {
            if self.options.max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            if self.options.exit_when_idle && self.is_idle() {
                info!(tick = %self.tick, "scripts finished; exiting");
                break;
            }
            if self.options.max_ticks.is_none() && !self.options.exit_when_idle && ticks == 0 {
                warn!("no --max-ticks or --exit-when-idle; running until interrupted");
            }

            let started = Instant::now();
            self.step()?;
            ticks += 1;

            if self.options.realtime {
                if let Some(rest) = tick_duration.checked_sub(started.elapsed()) {
                    std::thread::sleep(rest);
                }
            }
        }

        let threads_left = self.scheduler.thread_count();
        self.shutdown()?;
        Ok(RunSummary {
            ticks,
            threads_left,
        })
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown();
        self.shared.tasks.prune();
        self.flush_chat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

    fn workspace() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tickscript-host-{}-{}",
            std::process::id(),
            NEXT_DIR.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("scripts/farm")).unwrap();
        fs::create_dir_all(dir.join("macros")).unwrap();
        dir
    }

    fn config(dir: &std::path::Path) -> ScriptingConfig {
        ScriptingConfig {
            scripts_dir: dir.join("scripts"),
            macro_dir: dir.join("macros"),
            ..ScriptingConfig::default()
        }
    }

    fn texts(chat: &ChatLog) -> Vec<String> {
        chat.drain().into_iter().map(|line| line.text).collect()
    }

    #[test]
    fn reload_keys_scripts_by_relative_path() {
        let dir = workspace();
        fs::write(dir.join("scripts/hello.rhai"), r#"print("hi");"#).unwrap();
        fs::write(dir.join("scripts/farm/wheat.rhai"), "tick();").unwrap();
        let shared = HostShared::new(config(&dir));

        assert_eq!(shared.reload_scripts().unwrap(), 2);
        assert_eq!(
            shared.script_names(),
            vec!["farm/wheat.rhai".to_string(), "hello.rhai".to_string()]
        );

        shared.dispatch_to_chat("/cscript run hello.rhai");
        assert_eq!(texts(shared.chat()), vec!["hi", "Ran hello.rhai"]);

        shared.dispatch_to_chat("/cscript run nope");
        assert_eq!(texts(shared.chat()), vec!["Error: Script not found: nope"]);
    }

    #[test]
    fn scripts_can_exec_commands_that_start_scripts() {
        let dir = workspace();
        fs::write(dir.join("scripts/inner.rhai"), r#"tick(); print("inner");"#).unwrap();
        fs::write(
            dir.join("macros/outer.rhai"),
            r#"
                print(exec("/cscript reload"));
                exec("/cscript run inner.rhai");
                print("outer");
            "#,
        )
        .unwrap();
        let shared = HostShared::new(config(&dir));

        shared.dispatch_to_chat("/cscript exec outer.rhai");
        assert_eq!(
            texts(shared.chat()),
            vec!["Reloaded 1 script(s)", "outer", "Ran outer.rhai"]
        );
        assert_eq!(shared.scheduler().thread_count(), 1);

        shared.scheduler().advance();
        assert_eq!(texts(shared.chat()), vec!["inner"]);
        assert!(shared.scheduler().is_idle());
    }

    #[test]
    fn stop_all_unwinds_scripts_on_next_tick() {
        let dir = workspace();
        fs::write(dir.join("macros/forever.rhai"), "loop { tick(); }").unwrap();
        let mut host = HeadlessHost::new(
            config(&dir),
            HostOptions {
                exec: Some("forever.rhai".to_string()),
                ..HostOptions::default()
            },
        )
        .unwrap();
        host.startup().unwrap();
        assert_eq!(host.shared().scheduler().thread_count(), 1);
        assert_eq!(host.shared().tasks().count("cscript"), 1);

        host.shared().dispatch_to_chat("/ctask stop-all");
        host.step().unwrap();
        assert!(host.shared().scheduler().is_idle());
        assert!(host.shared().tasks().summary().is_empty());
    }

    #[test]
    fn blocking_scripts_suppress_item_use_and_add_keys() {
        let dir = workspace();
        fs::write(
            dir.join("macros/walk.rhai"),
            r#"
                set_input("forward", true);
                block_input(true);
                tick(2);
            "#,
        )
        .unwrap();
        fs::write(
            dir.join("input.json"),
            r#"{"steps": [{"ticks": 10, "left": true, "sprint": true, "use_item": true}]}"#,
        )
        .unwrap();
        let mut host = HeadlessHost::new(
            config(&dir),
            HostOptions {
                exec: Some("walk.rhai".to_string()),
                scripted_input: Some(dir.join("input.json")),
                ..HostOptions::default()
            },
        )
        .unwrap();
        host.startup().unwrap();

        host.step().unwrap();
        let player = host.player();
        assert_eq!(player.movement.movement_forward, 1.0);
        assert_eq!(player.movement.movement_sideways, 1.0);
        assert!(!player.sprinting);
        assert_eq!(player.item_uses_blocked, 1);

        host.step().unwrap();
        let player = host.player();
        assert_eq!(player.movement.movement_forward, 0.0);
        assert!(player.sprinting);
        assert_eq!(player.items_used, 1);
    }

    #[test]
    fn run_exits_when_idle() {
        let dir = workspace();
        fs::write(dir.join("macros/short.rhai"), "tick(3);").unwrap();
        let mut host = HeadlessHost::new(
            config(&dir),
            HostOptions {
                exec: Some("short.rhai".to_string()),
                exit_when_idle: true,
                max_ticks: Some(100),
                ..HostOptions::default()
            },
        )
        .unwrap();
        host.startup().unwrap();
        let summary = host.run().unwrap();
        assert_eq!(
            summary,
            RunSummary {
                ticks: 3,
                threads_left: 0
            }
        );
    }
}
