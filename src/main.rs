//! tickscript - cooperative script threads on a fixed-rate host tick
//!
//! Headless host executable: loads scripts, replays scheduled commands and
//! recorded player input, and advances script threads once per tick.

mod chat;
mod command_script;
mod commands;
mod config;
mod host;
mod scripted_input;

use anyhow::Result;
use config::ScriptingConfig;
use host::{HeadlessHost, HostOptions};
use std::{env, path::PathBuf};
use tracing::info;

fn main() -> Result<()> {
    // RUST_LOG overrides the default `info` level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting tickscript v{}", env!("CARGO_PKG_VERSION"));

    let cli = CliOptions::parse(env::args().skip(1));
    if cli.help {
        print_help();
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => ScriptingConfig::load_from_path(path),
        None => ScriptingConfig::load(),
    };

    let mut host = HeadlessHost::new(config, cli.host)?;
    host.startup()?;
    let summary = host.run()?;
    info!(
        ticks = summary.ticks,
        threads_left = summary.threads_left,
        "host stopped"
    );
    Ok(())
}

#[derive(Debug, Default)]
struct CliOptions {
    help: bool,
    config: Option<PathBuf>,
    host: HostOptions,
}

impl CliOptions {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => opts.help = true,
                "--config" => match args.next() {
                    Some(path) => opts.config = Some(PathBuf::from(path)),
                    None => tracing::error!("--config requires a file path"),
                },
                "--max-ticks" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u64>() {
                            Ok(value) => opts.host.max_ticks = Some(value),
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--max-ticks must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--max-ticks requires an integer");
                    }
                }
                "--exec" => match args.next() {
                    Some(file) => opts.host.exec = Some(file),
                    None => tracing::error!("--exec requires a macro file name"),
                },
                "--command-script" => match args.next() {
                    Some(path) => opts.host.command_schedule = Some(PathBuf::from(path)),
                    None => tracing::error!("--command-script requires a file path"),
                },
                "--scripted-input" => match args.next() {
                    Some(path) => opts.host.scripted_input = Some(PathBuf::from(path)),
                    None => tracing::error!("--scripted-input requires a file path"),
                },
                "--event-log" => match args.next() {
                    Some(path) => opts.host.event_log = Some(PathBuf::from(path)),
                    None => tracing::error!("--event-log requires a file path"),
                },
                "--realtime" => opts.host.realtime = true,
                "--exit-when-idle" => opts.host.exit_when_idle = true,
                other => tracing::warn!(arg = other, "ignoring unknown argument"),
            }
        }

        opts
    }
}

fn print_help() {
    println!(
        "Usage: tickscript [options]

Options:
  --config <file>           configuration file (default: config/tickscript.toml)
  --max-ticks <n>           stop after n ticks
  --exit-when-idle          stop once no script runs and no command is pending
  --exec <file>             run a macro from the macro directory at startup
  --command-script <file>   JSON schedule of commands to dispatch at given ticks
  --scripted-input <file>   JSON recording of the player's keys
  --event-log <file>        write commands and chat lines as JSON lines
  --realtime                sleep to hold the configured tick rate
  -h, --help                show this help"
    );
}
