use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};
use tickscript_core::MovementInput;

#[derive(Debug, Deserialize)]
struct ScriptedInputFile {
    steps: Vec<ScriptedStep>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
#[serde(default)]
struct ScriptedStep {
    /// How many ticks the step is held.
    ticks: u32,
    forward: bool,
    back: bool,
    left: bool,
    right: bool,
    jump: bool,
    sneak: bool,
    sprint: bool,
    use_item: bool,
}

/// Keys the real player holds during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerKeys {
    pub movement: MovementInput,
    pub sprint: bool,
    pub use_item: bool,
}

/// Replays recorded player keys, one step per `ticks` ticks.
///
/// The last step is held once the file runs out.
pub struct ScriptedInputPlayer {
    steps: Vec<ScriptedStep>,
    index: usize,
    ticks_in_step: u32,
}

impl ScriptedInputPlayer {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read scripted input {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("invalid scripted input {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: ScriptedInputFile = serde_json::from_str(contents)?;
        if file.steps.is_empty() {
            anyhow::bail!("scripted input file contains no steps");
        }
        if file.steps.iter().any(|step| step.ticks == 0) {
            anyhow::bail!("scripted input steps must last at least one tick");
        }
        Ok(Self {
            steps: file.steps,
            index: 0,
            ticks_in_step: 0,
        })
    }

    /// Keys for the next tick.
    pub fn next_tick(&mut self) -> PlayerKeys {
        let Some(step) = self.steps.get(self.index).copied() else {
            return PlayerKeys::default();
        };
        self.ticks_in_step += 1;
        if self.ticks_in_step >= step.ticks && self.index + 1 < self.steps.len() {
            self.index += 1;
            self.ticks_in_step = 0;
        }
        step.into_keys()
    }
}

impl ScriptedStep {
    fn into_keys(self) -> PlayerKeys {
        PlayerKeys {
            movement: MovementInput {
                pressing_forward: self.forward,
                pressing_back: self.back,
                pressing_left: self.left,
                pressing_right: self.right,
                jumping: self.jump,
                sneaking: self.sneak,
                ..MovementInput::zero()
            },
            sprint: self.sprint,
            use_item: self.use_item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_last_their_tick_count_and_the_last_is_held() {
        let mut player = ScriptedInputPlayer::from_json(
            r#"{"steps": [
                {"ticks": 2, "forward": true},
                {"ticks": 1, "jump": true, "use_item": true}
            ]}"#,
        )
        .expect("parse");

        assert!(player.next_tick().movement.pressing_forward);
        assert!(player.next_tick().movement.pressing_forward);
        let third = player.next_tick();
        assert!(third.movement.jumping && third.use_item);
        assert!(!third.movement.pressing_forward);
        assert!(player.next_tick().movement.jumping);
    }

    #[test]
    fn zero_length_steps_are_rejected() {
        assert!(ScriptedInputPlayer::from_json(r#"{"steps": [{"ticks": 0}]}"#).is_err());
        assert!(ScriptedInputPlayer::from_json(r#"{"steps": []}"#).is_err());
    }
}
