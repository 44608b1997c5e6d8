//! End-to-end Codex discovery against a scripted platform and real rollout
//! fixtures on disk.

mod test_utils;

use std::fs;
use std::path::PathBuf;

use spyglass::agents::codex;
use spyglass::data::{AgentStatus, Correlation};
use test_utils::MockPlatform;

const UUID: &str = "3f0a2b4c-1d2e-4f50-8a9b-0c1d2e3f4a5b";

fn rollout_fixture(dir: &std::path::Path, content: &str) -> PathBuf {
    let path = dir.join(format!("rollout-2026-03-04T08-15-00-{UUID}.jsonl"));
    fs::write(&path, content).unwrap();
    path
}

fn codex_platform(pid: u32, open_files: Vec<PathBuf>) -> MockPlatform {
    let mut platform = MockPlatform::default();
    platform
        .argv
        .insert(pid, vec!["/opt/codex/codex".to_string()]);
    platform.open_files.insert(pid, open_files);
    platform.cwds.insert(pid, "/home/dev/workdir".to_string());
    platform
}

#[tokio::test]
async fn running_task_reports_busy_with_live_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let rollout = rollout_fixture(dir.path(), "{\"payload\":{\"type\":\"task_started\"}}\n");
    let platform = codex_platform(314, vec![PathBuf::from("/dev/null"), rollout]);

    let sessions = codex::discover(&platform).await;
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];
    assert_eq!(session.status, AgentStatus::Busy);
    assert_eq!(session.session_id, UUID);
    assert_eq!(session.title, "-");
    assert_eq!(session.directory, "/home/dev/workdir");
    assert_eq!(session.pid, 314);
    assert_eq!(session.correlation, Correlation::Authoritative);
}

#[tokio::test]
async fn completed_task_reports_idle() {
    let dir = tempfile::tempdir().unwrap();
    let rollout = rollout_fixture(
        dir.path(),
        "{\"payload\":{\"type\":\"task_started\"}}\n{\"payload\":{\"type\":\"task_complete\"}}\n",
    );
    let platform = codex_platform(315, vec![rollout]);

    let sessions = codex::discover(&platform).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, AgentStatus::Idle);
}

#[tokio::test]
async fn empty_rollout_reports_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let rollout = rollout_fixture(dir.path(), "");
    let platform = codex_platform(316, vec![rollout]);

    let sessions = codex::discover(&platform).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, AgentStatus::Unknown);
}

#[tokio::test]
async fn process_without_open_rollout_is_not_attributable() {
    let platform = codex_platform(317, vec![PathBuf::from("/home/dev/notes.jsonl")]);
    let sessions = codex::discover(&platform).await;
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn rollout_vanishing_mid_probe_degrades_to_unknown() {
    // The open-files snapshot names a rollout that no longer exists by the
    // time the probe reads it.
    let gone = PathBuf::from(format!("/nonexistent/rollout-2026-03-04T08-15-00-{UUID}.jsonl"));
    let platform = codex_platform(318, vec![gone]);

    let sessions = codex::discover(&platform).await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, AgentStatus::Unknown);
}
