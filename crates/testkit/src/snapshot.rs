//! Golden-file snapshots.
//!
//! Values are stored as pretty JSON (two-space indent, trailing newline).
//! Object keys come out sorted because `serde_json::Map` is ordered.
//! Rerun with `TICKSCRIPT_UPDATE_SNAPSHOTS=1` to rewrite goldens.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Environment variable that switches snapshot assertions into update mode.
pub const UPDATE_SNAPSHOTS_ENV: &str = "TICKSCRIPT_UPDATE_SNAPSHOTS";

/// Compare `value` with the golden JSON at `path`, or rewrite it in update mode.
pub fn assert_json_snapshot<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let actual = to_snapshot_json(value)?;

    if update_requested() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, &actual)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        tracing::info!(path = %path.display(), "snapshot updated");
        return Ok(());
    }

    let expected = fs::read_to_string(path).with_context(|| {
        format!(
            "snapshot missing at {} (rerun with {UPDATE_SNAPSHOTS_ENV}=1 to create it)",
            path.display()
        )
    })?;
    // Tolerate CRLF checkouts.
    let expected = expected.replace("\r\n", "\n");

    if let Some((line, want, got)) = first_difference(&expected, &actual) {
        anyhow::bail!(
            "snapshot mismatch at {} line {line}\n  expected: {want}\n    actual: {got}\n(rerun with {UPDATE_SNAPSHOTS_ENV}=1 to update)",
            path.display()
        );
    }
    Ok(())
}

/// Serialize `value` exactly as it is stored in golden files.
pub fn to_snapshot_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("failed to serialize snapshot value")?;
    let mut json = serde_json::to_string_pretty(&value).context("failed to format snapshot")?;
    json.push('\n');
    Ok(json)
}

fn update_requested() -> bool {
    matches!(
        std::env::var(UPDATE_SNAPSHOTS_ENV).as_deref(),
        Ok("1") | Ok("true") | Ok("yes")
    )
}

fn first_difference<'a>(expected: &'a str, actual: &'a str) -> Option<(usize, &'a str, &'a str)> {
    let mut want = expected.lines();
    let mut got = actual.lines();
    let mut line = 1;
    loop {
        match (want.next(), got.next()) {
            (None, None) => return None,
            (a, b) if a == b => line += 1,
            (a, b) => return Some((line, a.unwrap_or("<eof>"), b.unwrap_or("<eof>"))),
        }
    }
}
