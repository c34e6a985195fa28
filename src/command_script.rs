use anyhow::{Context, Result};
use serde::Deserialize;
use std::{collections::VecDeque, fs, path::Path};
use tickscript_core::SimTick;

#[derive(Debug, Deserialize)]
struct CommandScheduleFile {
    steps: Vec<ScheduledCommandDef>,
}

#[derive(Debug, Deserialize)]
struct ScheduledCommandDef {
    tick: u64,
    command: String,
}

#[derive(Debug, Clone)]
struct ScheduledCommand {
    tick: SimTick,
    command: String,
}

/// Commands to dispatch at fixed ticks, in file order.
///
/// The file is `{"steps": [{"tick": 0, "command": "/cscript run walk"}, ...]}`
/// with steps sorted by tick.
#[derive(Debug)]
pub struct CommandSchedule {
    pending: VecDeque<ScheduledCommand>,
}

impl CommandSchedule {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read command schedule {}", path.display()))?;
        contents
            .parse()
            .with_context(|| format!("invalid command schedule {}", path.display()))
    }

    /// Drain every command due at or before `tick`.
    pub fn drain_due(&mut self, tick: SimTick) -> Vec<String> {
        let mut due = Vec::new();
        while self.pending.front().is_some_and(|step| step.tick <= tick) {
            if let Some(step) = self.pending.pop_front() {
                due.push(step.command);
            }
        }
        due
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl std::str::FromStr for CommandSchedule {
    type Err = anyhow::Error;

    fn from_str(contents: &str) -> Result<Self> {
        let file: CommandScheduleFile = serde_json::from_str(contents)?;
        if file.steps.is_empty() {
            anyhow::bail!("command schedule contains no steps");
        }

        let mut pending = VecDeque::with_capacity(file.steps.len());
        for step in file.steps {
            let command = step.command.trim().to_string();
            if command.is_empty() {
                anyhow::bail!("command schedule contains an empty command");
            }
            if pending
                .back()
                .is_some_and(|prev: &ScheduledCommand| SimTick(step.tick) < prev.tick)
            {
                anyhow::bail!("command schedule steps must be sorted by tick");
            }
            pending.push_back(ScheduledCommand {
                tick: SimTick(step.tick),
                command,
            });
        }

        Ok(Self { pending })
    }
}
