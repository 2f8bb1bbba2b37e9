//! Basic CLI E2E tests.
//!
//! Each test runs the binary against its own temporary home directory.

mod common;

use common::{add_task, parse_json, run_cli_failure, run_cli_success};
use tempfile::TempDir;

#[test]
fn test_task_add_and_list() {
    let home = TempDir::new().unwrap();
    let id = add_task(home.path(), "Write report", 45);

    let list = parse_json(&run_cli_success(home.path(), &["task", "list"]));
    let tasks = list.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["id"], id.as_str());
    assert_eq!(tasks[0]["estimated_duration_minutes"], 45);
}

#[test]
fn test_task_status_hides_completed() {
    let home = TempDir::new().unwrap();
    let id = add_task(home.path(), "Done", 10);

    let updated = parse_json(&run_cli_success(
        home.path(),
        &["task", "status", &id, "completed"],
    ));
    assert_eq!(updated["status"], "completed");

    let open = parse_json(&run_cli_success(home.path(), &["task", "list"]));
    assert!(open.as_array().unwrap().is_empty());
    let all = parse_json(&run_cli_success(home.path(), &["task", "list", "--all"]));
    assert_eq!(all.as_array().unwrap().len(), 1);
}

#[test]
fn test_task_status_unknown_id_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr) = run_cli_failure(home.path(), &["task", "status", "missing", "completed"]);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_rank_selects_within_budget() {
    let home = TempDir::new().unwrap();
    add_task(home.path(), "Short", 20);
    add_task(home.path(), "Medium", 30);
    add_task(home.path(), "Huge", 300);

    let out = parse_json(&run_cli_success(home.path(), &["rank", "--minutes", "60"]));
    let ranked = out["ranked"].as_array().unwrap();
    assert_eq!(ranked.len(), 2, "the 300 minute task is not eligible");
    assert!(out["total_minutes"].as_u64().unwrap() <= 60 + 30);
}

#[test]
fn test_session_lifecycle_across_invocations() {
    let home = TempDir::new().unwrap();
    let first = add_task(home.path(), "First", 20);
    let second = add_task(home.path(), "Second", 20);
    let tasks = format!("{first},{second}");

    let started = parse_json(&run_cli_success(
        home.path(),
        &["session", "start", "--type", "deep_work", "--tasks", &tasks],
    ));
    assert_eq!(started["status"], "active");
    assert_eq!(started["session"]["current_task"]["id"], first.as_str());

    let paused = parse_json(&run_cli_success(home.path(), &["session", "pause"]));
    assert_eq!(paused["status"], "paused");
    let resumed = parse_json(&run_cli_success(home.path(), &["session", "resume"]));
    assert_eq!(resumed["status"], "active");

    let completed = parse_json(&run_cli_success(home.path(), &["session", "complete"]));
    assert_eq!(completed["result"]["next_task"]["id"], second.as_str());

    let ended = parse_json(&run_cli_success(
        home.path(),
        &["session", "end", "--rating", "4"],
    ));
    assert_eq!(ended["status"], "ended");
    assert_eq!(ended["result"]["completed_task_ids"][0], first.as_str());
    assert_eq!(ended["result"]["end_data"]["focus_rating"], 4);

    let status = parse_json(&run_cli_success(home.path(), &["session", "status"]));
    assert_eq!(status["status"], "idle");
}

#[test]
fn test_pause_without_session_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr) = run_cli_failure(home.path(), &["session", "pause"]);
    assert!(stderr.contains("Invalid session state"));
}

#[test]
fn test_interrupt_is_queued_in_strict_session() {
    let home = TempDir::new().unwrap();
    let id = add_task(home.path(), "Focus", 30);
    run_cli_success(
        home.path(),
        &["session", "start", "--type", "deep_work", "--tasks", &id],
    );

    let out = parse_json(&run_cli_success(
        home.path(),
        &["session", "interrupt", "--source", "chat", "--sender", "sam", "lunch?"],
    ));
    assert_eq!(out["result"]["decision"], "queue");

    let emergency = parse_json(&run_cli_success(
        home.path(),
        &["session", "interrupt", "--source", "mail", "production outage"],
    ));
    assert_eq!(emergency["result"]["decision"], "allow");

    let released = parse_json(&run_cli_success(home.path(), &["session", "override"]));
    assert_eq!(released["result"]["released"].as_array().unwrap().len(), 1);
}

#[test]
fn test_flow_score_from_file() {
    let home = TempDir::new().unwrap();
    let sample = home.path().join("sample.json");
    std::fs::write(
        &sample,
        r#"{"window_start":"2026-03-02T09:00:00Z","window_end":"2026-03-02T09:30:00Z"}"#,
    )
    .unwrap();

    let out = parse_json(&run_cli_success(
        home.path(),
        &["flow", "score", sample.to_str().unwrap()],
    ));
    assert_eq!(out["is_in_flow"], false);
}

#[test]
fn test_config_set_and_get() {
    let home = TempDir::new().unwrap();
    run_cli_success(home.path(), &["config", "set", "session.planned_minutes", "75"]);
    let value = run_cli_success(home.path(), &["config", "get", "session.planned_minutes"]);
    assert_eq!(value.trim(), "75");

    run_cli_failure(home.path(), &["config", "set", "session.nope", "1"]);
    run_cli_success(home.path(), &["config", "reset"]);
    let value = run_cli_success(home.path(), &["config", "get", "session.planned_minutes"]);
    assert_eq!(value.trim(), "60");
}
