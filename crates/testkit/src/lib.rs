#![warn(missing_docs)]
//! Testing surfaces for tick-driven script runs: event logs and golden traces.

mod snapshot;
mod trace;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tickscript_core::SimTick;

pub use snapshot::*;
pub use trace::*;

/// One line of a host event log.
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    /// Tick during which the event occurred.
    pub tick: SimTick,
    /// Short kind label (`"command"`, `"print"`, `"error"`, ...).
    pub kind: &'a str,
    /// Free-form payload.
    pub payload: &'a str,
}

/// Writes newline-delimited JSON event records.
pub struct JsonlSink {
    out: BufWriter<File>,
}

impl JsonlSink {
    /// Create (or truncate) the log at `path`, creating parent directories.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create event log {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    /// Append one record.
    pub fn write(&mut self, event: &EventRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, event)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    /// Flush buffered records to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        if let Err(err) = self.out.flush() {
            tracing::warn!(%err, "failed to flush event log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let path = std::env::temp_dir().join(format!(
            "tickscript-events-{}.jsonl",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        {
            let mut sink = JsonlSink::create(&path).expect("sink create");
            for (tick, payload) in [(0, "/cscript list"), (3, "hello")] {
                sink.write(&EventRecord {
                    tick: SimTick(tick),
                    kind: "command",
                    payload,
                })
                .expect("write succeeds");
            }
        }
        let contents = fs::read_to_string(&path).expect("file readable");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            r#"{"tick":3,"kind":"command","payload":"hello"}"#
        );
        let _ = fs::remove_file(&path);
    }
}
