use assert_cmd::cargo;
use rstest::rstest;
use std::io::Write;
use tempfile::NamedTempFile;

const SCENARIO: &str = r#"
[target]
program = "app.js"

[[breakpoints]]
path = "a.js"
row = 10

[[steps]]
action = "start"

[[steps]]
action = "engine-breakpoint"
event = { kind = "moved", path = "a.js", row = 10, buffer-row = 12 }

[[steps]]
action = "stop"

[[steps]]
action = "call-stack"
"#;

fn scenario_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write to temp file");
    file
}

#[test]
fn test_replay_prints_json_lines() -> Result<(), Box<dyn std::error::Error>> {
    let file = scenario_file(SCENARIO);
    let mut cmd = cargo::cargo_bin_cmd!("dbg-proxy");

    let output = cmd.arg("replay").arg(file.path()).output()?;
    assert!(output.status.success());

    let lines = String::from_utf8(output.stdout)?
        .lines()
        .map(serde_json::from_str::<serde_json::Value>)
        .collect::<Result<Vec<_>, _>>()?;
    let channels = lines
        .iter()
        .map(|line| line["channel"].as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();

    assert_eq!(
        channels,
        vec![
            "breakpoint",
            "session",
            "breakpoint",
            "session",
            "breakpoint",
            "error"
        ]
    );
    assert_eq!(lines[4]["event"]["buffer-row"], 10);
    assert_eq!(lines[5]["event"], "No debug session in progress");

    Ok(())
}

#[test]
fn test_check_summarizes_scenario() {
    let file = scenario_file(SCENARIO);
    let mut cmd = cargo::cargo_bin_cmd!("dbg-proxy");

    let assert = cmd.arg("check").arg(file.path()).assert();
    let stdout = String::from_utf8(assert.success().get_output().stdout.clone()).unwrap();

    assert!(stdout.contains("1 breakpoints, 4 steps, 1 sessions (a.js:10)"));
}

#[rstest]
#[case::invalid_toml("[target\n")]
#[case::engine_event_first(
    "[target]\nprogram = \"app.js\"\n\n[[steps]]\naction = \"engine-session\"\nevent = { kind = \"terminated\" }\n"
)]
fn test_invalid_scenario_fails(#[case] content: &str) {
    let file = scenario_file(content);
    let mut cmd = cargo::cargo_bin_cmd!("dbg-proxy");

    cmd.arg("check").arg(file.path()).assert().failure();
}

#[test]
fn test_missing_scenario_fails() {
    let mut cmd = cargo::cargo_bin_cmd!("dbg-proxy");

    cmd.arg("replay")
        .arg("does-not-exist.toml")
        .assert()
        .failure();
}
