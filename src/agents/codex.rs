//! Codex discoverer.
//!
//! A running Codex process holds its rollout log open, and the log's filename
//! embeds the thread UUID — an authoritative process-to-session correlation.
//! Status comes from the rollout's final record; title and launch directory
//! are enriched from the local thread database when available.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::data::{AgentKind, AgentSession, AgentStatus, Correlation};
use crate::platform::Platform;
use crate::probe::probe_all;

static CODEX_BIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"codex/codex$").unwrap());

/// Rollout filename convention:
/// rollout-2026-02-26T23-51-07-019c9aa5-8f55-7833-b235-d00a5faa09d0.jsonl
/// The trailing UUID is the thread id.
static ROLLOUT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"rollout.*?([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})\.jsonl$",
    )
    .unwrap()
});

#[derive(Debug, Default, Deserialize)]
struct RolloutLine {
    #[serde(default)]
    payload: RolloutPayload,
}

#[derive(Debug, Default, Deserialize)]
struct RolloutPayload {
    #[serde(rename = "type", default)]
    kind: String,
}

/// Thread metadata from the Codex state database.
#[derive(Debug)]
pub struct ThreadInfo {
    pub title: String,
    pub cwd: String,
}

/// Find all running Codex processes and determine their status.
pub async fn discover(platform: &dyn Platform) -> Vec<AgentSession> {
    let pids = platform.find_pids_by_name(&CODEX_BIN_RE);
    if pids.is_empty() {
        return Vec::new();
    }
    probe_all(pids, |pid| async move { probe_pid(platform, pid) }).await
}

/// Probe one Codex process. A process without an open rollout file is not yet
/// attributable to a session and yields nothing.
fn probe_pid(platform: &dyn Platform, pid: u32) -> Option<AgentSession> {
    let (rollout_path, thread_id) = find_rollout_file(platform.list_open_files(pid))?;

    let status = rollout_status(&rollout_path);
    let mut title = "-".to_string();
    let mut directory = platform.process_cwd(pid);

    // The stored cwd is the original launch directory, more stable than a
    // possibly-relocated live cwd.
    if let Some(db) = state_db_path() {
        match lookup_thread(&db, &thread_id) {
            Some(info) => {
                if !info.title.is_empty() {
                    title = info.title;
                }
                if !info.cwd.is_empty() {
                    directory = info.cwd;
                }
            }
            None => tracing::debug!(%thread_id, "no thread metadata in codex state db"),
        }
    }

    Some(AgentSession {
        agent: AgentKind::Codex,
        status,
        session_id: thread_id,
        title,
        directory,
        pid,
        correlation: Correlation::Authoritative,
    })
}

/// Scan a process's open files for a rollout log; returns its path and the
/// extracted thread UUID.
pub fn find_rollout_file(files: Vec<PathBuf>) -> Option<(PathBuf, String)> {
    for file in files {
        let Some(name) = file.to_str() else {
            continue;
        };
        let thread_id = ROLLOUT_RE
            .captures(name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        if let Some(thread_id) = thread_id {
            return Some((file, thread_id));
        }
    }
    None
}

/// Derive status from the last non-blank line of a rollout log.
///
/// `task_complete` closes the turn; any other parsed record means the thread
/// is still working. An empty file, an unparsable final record, or an
/// unreadable file all yield unknown.
pub fn rollout_status(path: &Path) -> AgentStatus {
    let Ok(file) = File::open(path) else {
        return AgentStatus::Unknown;
    };

    let mut last = String::new();
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if !line.trim().is_empty() {
            last = line;
        }
    }
    if last.is_empty() {
        return AgentStatus::Unknown;
    }

    match serde_json::from_str::<RolloutLine>(&last) {
        Ok(entry) if entry.payload.kind == "task_complete" => AgentStatus::Idle,
        Ok(_) => AgentStatus::Busy,
        Err(_) => AgentStatus::Unknown,
    }
}

/// Fetch thread metadata from the Codex state database, read-only. Any
/// failure (missing file, lock, schema drift) degrades to no enrichment.
pub fn lookup_thread(db: &Path, thread_id: &str) -> Option<ThreadInfo> {
    let conn = Connection::open_with_flags(db, OpenFlags::SQLITE_OPEN_READ_ONLY).ok()?;
    conn.query_row(
        "SELECT title, cwd FROM threads WHERE id = ?1",
        [thread_id],
        |row| {
            Ok(ThreadInfo {
                title: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
                cwd: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            })
        },
    )
    .ok()
}

fn state_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".codex").join("state_5.sqlite"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UUID: &str = "019c9aa5-8f55-7833-b235-d00a5faa09d0";

    fn rollout_file(dir: &Path, lines: &str) -> PathBuf {
        let path = dir.join(format!("rollout-2026-02-26T23-51-07-{UUID}.jsonl"));
        let mut file = File::create(&path).unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        path
    }

    #[test]
    fn rollout_filename_yields_thread_uuid() {
        let files = vec![
            PathBuf::from("/dev/null"),
            PathBuf::from("/home/dev/.codex/log/other.jsonl"),
            PathBuf::from(format!(
                "/home/dev/.codex/sessions/rollout-2026-02-26T23-51-07-{UUID}.jsonl"
            )),
        ];
        let (path, thread_id) = find_rollout_file(files).unwrap();
        assert_eq!(thread_id, UUID);
        assert!(path.to_str().unwrap().ends_with(".jsonl"));
    }

    #[test]
    fn non_rollout_files_do_not_match() {
        assert!(find_rollout_file(vec![
            PathBuf::from("/tmp/notes.jsonl"),
            PathBuf::from(format!("/tmp/rollout-{UUID}.json")),
        ])
        .is_none());
    }

    #[test]
    fn task_complete_terminal_line_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let path = rollout_file(
            dir.path(),
            "{\"payload\":{\"type\":\"task_started\"}}\n{\"payload\":{\"type\":\"task_complete\"}}\n",
        );
        assert_eq!(rollout_status(&path), AgentStatus::Idle);
    }

    #[test]
    fn other_terminal_line_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = rollout_file(dir.path(), "{\"payload\":{\"type\":\"task_started\"}}\n");
        assert_eq!(rollout_status(&path), AgentStatus::Busy);
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = rollout_file(
            dir.path(),
            "{\"payload\":{\"type\":\"task_complete\"}}\n\n   \n",
        );
        assert_eq!(rollout_status(&path), AgentStatus::Idle);
    }

    #[test]
    fn empty_file_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = rollout_file(dir.path(), "");
        assert_eq!(rollout_status(&path), AgentStatus::Unknown);
    }

    #[test]
    fn unparsable_terminal_line_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = rollout_file(dir.path(), "not json at all\n");
        assert_eq!(rollout_status(&path), AgentStatus::Unknown);
    }

    #[test]
    fn missing_file_is_unknown() {
        assert_eq!(
            rollout_status(Path::new("/nonexistent/rollout.jsonl")),
            AgentStatus::Unknown
        );
    }

    #[test]
    fn thread_lookup_reads_title_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state_5.sqlite");
        let conn = Connection::open(&db).unwrap();
        conn.execute_batch(
            "CREATE TABLE threads (id TEXT PRIMARY KEY, title TEXT, rollout_path TEXT, cwd TEXT);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO threads (id, title, rollout_path, cwd) VALUES (?1, ?2, ?3, ?4)",
            (UUID, "refactor session", "/tmp/rollout.jsonl", "/home/dev/app"),
        )
        .unwrap();
        drop(conn);

        let info = lookup_thread(&db, UUID).unwrap();
        assert_eq!(info.title, "refactor session");
        assert_eq!(info.cwd, "/home/dev/app");
        assert!(lookup_thread(&db, "0000aaaa-0000-0000-0000-000000000000").is_none());
    }

    #[test]
    fn missing_database_degrades_to_none() {
        assert!(lookup_thread(Path::new("/nonexistent/state.sqlite"), UUID).is_none());
    }
}
