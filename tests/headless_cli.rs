use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

fn workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "tickscript_cli_{name}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("scripts")).expect("create scripts dir");
    fs::create_dir_all(dir.join("macros")).expect("create macro dir");
    fs::write(
        dir.join("tickscript.toml"),
        format!(
            "tick_rate = 20\nscripts_dir = {:?}\nmacro_dir = {:?}\n",
            dir.join("scripts").display().to_string(),
            dir.join("macros").display().to_string()
        ),
    )
    .expect("write config");
    dir
}

fn run(dir: &Path, extra: &[&str]) -> Vec<Value> {
    let log = dir.join("events.jsonl");
    let config = dir.join("tickscript.toml");
    let bin = env!("CARGO_BIN_EXE_tickscript");
    let status = Command::new(bin)
        .args(["--config", config.to_str().unwrap()])
        .args(["--event-log", log.to_str().unwrap()])
        .args(extra)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .expect("spawn tickscript");
    assert!(status.success(), "tickscript exited with {status}");

    fs::read_to_string(&log)
        .expect("event log written")
        .lines()
        .map(|line| serde_json::from_str(line).expect("event is json"))
        .collect()
}

fn events_of<'a>(events: &'a [Value], kind: &str) -> Vec<(u64, &'a str)> {
    events
        .iter()
        .filter(|event| event["kind"] == kind)
        .map(|event| {
            (
                event["tick"].as_u64().expect("tick"),
                event["payload"].as_str().expect("payload"),
            )
        })
        .collect()
}

#[test]
fn exec_macro_prints_across_ticks() {
    let dir = workspace("exec");
    fs::write(
        dir.join("macros/count.rhai"),
        r#"
            for i in 1..=3 {
                print(`step ${i}`);
                tick();
            }
        "#,
    )
    .expect("write macro");

    let events = run(&dir, &["--exec", "count.rhai", "--exit-when-idle", "--max-ticks", "50"]);
    assert_eq!(
        events_of(&events, "print"),
        vec![(0, "step 1"), (1, "step 2"), (2, "step 3")]
    );
    assert_eq!(
        events_of(&events, "command"),
        vec![(0, "/cscript reload"), (0, "/cscript exec count.rhai")]
    );
}

#[test]
fn scheduled_stop_all_ends_looping_script() {
    let dir = workspace("schedule");
    fs::write(
        dir.join("scripts/spin.rhai"),
        r#"
            let n = 0;
            loop {
                n += 1;
                print(`spin ${n}`);
                tick();
            }
        "#,
    )
    .expect("write script");
    fs::write(
        dir.join("commands.json"),
        r#"{"steps": [
            {"tick": 1, "command": "/cscript run spin.rhai"},
            {"tick": 3, "command": "/ctask stop-all"},
            {"tick": 4, "command": "/threads"}
        ]}"#,
    )
    .expect("write command schedule");

    let schedule = dir.join("commands.json");
    let events = run(
        &dir,
        &[
            "--command-script",
            schedule.to_str().unwrap(),
            "--exit-when-idle",
            "--max-ticks",
            "50",
        ],
    );

    // commands are dispatched before the tick's advance, so the new thread also runs at tick 1
    assert_eq!(
        events_of(&events, "print"),
        vec![(1, "spin 1"), (1, "spin 2"), (2, "spin 3")]
    );
    let feedback = events_of(&events, "feedback");
    assert!(feedback.contains(&(3, "Stopped 1 task(s)")), "{feedback:?}");
    assert!(feedback.contains(&(4, "No script threads running")), "{feedback:?}");
    assert!(events_of(&events, "error").is_empty());
}
