use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tickscript_scripting::SchedulerConfig;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/tickscript.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Host ticks per second.
    pub tick_rate: u32,
    /// Root of the scripts loaded by `/cscript reload`.
    pub scripts_dir: PathBuf,
    /// Directory `/cscript exec <file>` resolves against.
    pub macro_dir: PathBuf,
    pub scheduler: SchedulerConfig,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            scripts_dir: PathBuf::from("scripts"),
            macro_dir: PathBuf::from("macros"),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl ScriptingConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        let config = match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ScriptingConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    ScriptingConfig::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config not found at {}. Using defaults", path.display());
                ScriptingConfig::default()
            }
            Err(err) => {
                warn!("Failed to read {}: {err}. Using defaults", path.display());
                ScriptingConfig::default()
            }
        };
        config.sanitized()
    }

    /// Save configuration to an explicit path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        if self.tick_rate == 0 {
            warn!("tick_rate must be positive; using 20");
            self.tick_rate = 20;
        }
        if self.scheduler.shutdown_passes == 0 {
            warn!("scheduler.shutdown_passes must be positive; using 1");
            self.scheduler.shutdown_passes = 1;
        }
        self
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate))
    }
}
