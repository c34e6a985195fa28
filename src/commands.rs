use std::fmt;

use tickscript_scripting::ThreadHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CommandError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    Help,
    Say { message: String },
    ScriptReload,
    ScriptRun { name: String },
    ScriptExec { file: String },
    ScriptList,
    TaskList,
    TaskStopAll,
    Threads,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub lines: Vec<String>,
}

/// Host services the commands act on.
///
/// Methods take `&self`: scripts started by a command may dispatch further
/// commands through `exec` while the first one is still running.
pub trait CommandContext {
    /// Reload every legacy script. Returns how many were loaded.
    fn reload_scripts(&self) -> anyhow::Result<usize>;
    /// Names of the loaded legacy scripts, sorted.
    fn script_names(&self) -> Vec<String>;
    fn run_script(&self, name: &str) -> anyhow::Result<ThreadHandle>;
    fn exec_macro(&self, file: &str) -> anyhow::Result<ThreadHandle>;
    /// Live task count per group.
    fn task_summary(&self) -> Vec<(String, usize)>;
    /// Cancel every registered task. Returns how many were cancelled.
    fn stop_all_tasks(&self) -> usize;
    fn live_threads(&self) -> Vec<ThreadHandle>;
}

pub fn execute_command(ctx: &impl CommandContext, cmd: HostCommand) -> CommandOutput {
    let mut out = CommandOutput::default();
    match cmd {
        HostCommand::Help => out.lines.extend(help_lines()),
        HostCommand::Say { message } => out.lines.push(message),
        HostCommand::ScriptReload => match ctx.reload_scripts() {
            Ok(count) => out.lines.push(format!("Reloaded {count} script(s)")),
            Err(err) => out.lines.push(format!("Error: {err:#}")),
        },
        HostCommand::ScriptRun { name } => match ctx.run_script(&name) {
            Ok(thread) => out.lines.push(describe_start(&name, &thread)),
            Err(err) => out.lines.push(format!("Error: {err:#}")),
        },
        HostCommand::ScriptExec { file } => match ctx.exec_macro(&file) {
            Ok(thread) => out.lines.push(describe_start(&file, &thread)),
            Err(err) => out.lines.push(format!("Error: {err:#}")),
        },
        HostCommand::ScriptList => {
            let names = ctx.script_names();
            if names.is_empty() {
                out.lines.push("No scripts loaded".to_string());
            } else {
                out.lines.push(format!("{} script(s):", names.len()));
                out.lines.extend(names.into_iter().map(|name| format!("  {name}")));
            }
        }
        HostCommand::TaskList => {
            let summary = ctx.task_summary();
            if summary.is_empty() {
                out.lines.push("No running tasks".to_string());
            } else {
                for (group, count) in summary {
                    out.lines.push(format!("{group}: {count} task(s)"));
                }
            }
        }
        HostCommand::TaskStopAll => {
            let stopped = ctx.stop_all_tasks();
            out.lines.push(format!("Stopped {stopped} task(s)"));
        }
        HostCommand::Threads => {
            let threads = ctx.live_threads();
            if threads.is_empty() {
                out.lines.push("No script threads running".to_string());
            }
            for thread in threads {
                let mut flags = Vec::new();
                if thread.is_daemon() {
                    flags.push("daemon");
                }
                if thread.is_paused() {
                    flags.push("paused");
                }
                if thread.is_killed() {
                    flags.push("killed");
                }
                let line = if flags.is_empty() {
                    format!("{}", thread.id())
                } else {
                    format!("{} ({})", thread.id(), flags.join(", "))
                };
                out.lines.push(line);
            }
        }
    }
    out
}

fn describe_start(name: &str, thread: &ThreadHandle) -> String {
    if thread.is_running() {
        format!("Started {name} as thread {}", thread.id())
    } else {
        format!("Ran {name}")
    }
}

pub fn parse_command(input: &str) -> Result<HostCommand, CommandError> {
    let input = input.trim();
    let input = input.strip_prefix('/').unwrap_or(input).trim();
    if input.is_empty() {
        return Ok(HostCommand::Help);
    }

    let mut parts = input.split_whitespace();
    let cmd = parts
        .next()
        .ok_or_else(|| CommandError::new("Missing command"))?
        .to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match cmd.as_str() {
        "help" | "?" => Ok(HostCommand::Help),
        "say" => {
            if args.is_empty() {
                return Err(CommandError::new("Usage: /say <message>"));
            }
            Ok(HostCommand::Say {
                message: args.join(" "),
            })
        }
        "cscript" => parse_cscript_command(&args),
        "ctask" => parse_ctask_command(&args),
        "threads" => Ok(HostCommand::Threads),
        _ => Err(CommandError::new(format!(
            "Unknown command: {cmd}. Try /help"
        ))),
    }
}

fn parse_cscript_command(args: &[&str]) -> Result<HostCommand, CommandError> {
    match args {
        ["reload"] => Ok(HostCommand::ScriptReload),
        ["list"] => Ok(HostCommand::ScriptList),
        ["run", name] => Ok(HostCommand::ScriptRun {
            name: (*name).to_string(),
        }),
        ["exec", file] => Ok(HostCommand::ScriptExec {
            file: (*file).to_string(),
        }),
        ["run", ..] => Err(CommandError::new("Usage: /cscript run <name>")),
        ["exec", ..] => Err(CommandError::new("Usage: /cscript exec <file>")),
        _ => Err(CommandError::new(
            "Usage: /cscript <reload|list|run <name>|exec <file>>",
        )),
    }
}

fn parse_ctask_command(args: &[&str]) -> Result<HostCommand, CommandError> {
    match args {
        ["list"] => Ok(HostCommand::TaskList),
        ["stop-all"] => Ok(HostCommand::TaskStopAll),
        _ => Err(CommandError::new("Usage: /ctask <list|stop-all>")),
    }
}

fn help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  /help".to_string(),
        "  /say <message>".to_string(),
        "  /cscript reload             reload scripts from the scripts directory".to_string(),
        "  /cscript list".to_string(),
        "  /cscript run <name>         run a loaded script".to_string(),
        "  /cscript exec <file>        run a file from the macro directory".to_string(),
        "  /ctask list".to_string(),
        "  /ctask stop-all             stop every running script".to_string(),
        "  /threads                    list live script threads".to_string(),
    ]
}
