//! Common utilities for CLI E2E tests.

use std::path::Path;
use std::process::Command;

/// Invoke a CLI command with `home` as the user's home directory and
/// return (stdout, stderr, exit code).
pub fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_deepfocus-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("DEEPFOCUS_ENV")
        .env_remove("DEEPFOCUS_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

/// Invoke a CLI command and expect success.
pub fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command failed: {:?}\n{}", args, stderr);
    stdout
}

/// Invoke a CLI command and expect failure.
pub fn run_cli_failure(home: &Path, args: &[&str]) -> (String, String) {
    let (stdout, stderr, code) = run_cli(home, args);
    assert!(code != 0, "CLI command unexpectedly succeeded: {:?}", args);
    (stdout, stderr)
}

/// Parse JSON output from CLI.
pub fn parse_json(json: &str) -> serde_json::Value {
    serde_json::from_str(json).expect("Failed to parse JSON output")
}

/// Add a task and return its id.
pub fn add_task(home: &Path, title: &str, minutes: u32) -> String {
    let minutes = minutes.to_string();
    let out = run_cli_success(home, &["task", "add", title, "--minutes", &minutes]);
    parse_json(&out)["id"].as_str().unwrap().to_string()
}
