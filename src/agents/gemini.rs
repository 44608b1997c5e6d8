//! Gemini CLI discoverer.
//!
//! Gemini spawns a child process with argv identical to its parent, so naive
//! argument matching double-counts; children are filtered out by parent-PID
//! membership before correlation. Surviving processes are then paired with
//! session files per working directory, by creation order — a best-effort
//! heuristic, not a proven identity mapping.
//!
//! Session files: ~/.gemini/tmp/{project}/chats/session-*.json

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{AgentKind, AgentSession, AgentStatus, Correlation};
use crate::platform::Platform;

static GEMINI_ARG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|/)gemini$").unwrap());

/// Parsed session file with the project directory it belongs to.
#[derive(Debug, Clone)]
struct SessionFile {
    project_dir: PathBuf,
    session: Session,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Session {
    #[serde(rename = "sessionId", default)]
    session_id: String,
    #[serde(rename = "startTime", default)]
    start_time: String,
    #[serde(default)]
    messages: Vec<SessionMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionMessage {
    #[serde(rename = "type", default)]
    kind: String,
}

/// Find all running Gemini CLI processes and determine their status.
pub async fn discover(platform: &dyn Platform) -> Vec<AgentSession> {
    let pids = platform.find_pids_by_args(&GEMINI_ARG_RE);
    if pids.is_empty() {
        return Vec::new();
    }

    let parents = filter_parents(platform, &pids);
    let sessions = match sessions_root() {
        Some(root) => load_sessions(&root),
        None => Vec::new(),
    };

    if sessions.is_empty() {
        // Processes running but no session corpus: reportable, unknowable.
        return parents
            .into_iter()
            .map(|pid| unmatched(&platform.process_cwd(pid), pid))
            .collect();
    }

    // Group parent PIDs by live working directory; a process whose cwd is
    // unreadable cannot be paired.
    let mut by_cwd: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for pid in parents {
        let cwd = platform.process_cwd(pid);
        if cwd.is_empty() || cwd == "-" {
            continue;
        }
        by_cwd.entry(cwd).or_default().push(pid);
    }

    let mut results = Vec::new();
    for (cwd, pids_in_cwd) in by_cwd {
        let matching: Vec<&SessionFile> = sessions
            .iter()
            .filter(|sf| project_matches(&cwd, &sf.project_dir))
            .collect();
        results.extend(pair_group(&cwd, pids_in_cwd, matching));
    }
    results
}

/// Drop PIDs whose parent is also a candidate: the child duplicates the
/// parent's argv and only the root process owns a session.
fn filter_parents(platform: &dyn Platform, pids: &[u32]) -> Vec<u32> {
    pids.iter()
        .copied()
        .filter(|&pid| !pids.contains(&platform.process_ppid(pid)))
        .collect()
}

/// Pair one directory's processes with its session files positionally: PIDs
/// ascending against start times ascending, on the premise that processes
/// and sessions are created in the same relative order. Processes beyond the
/// session count stay unknown.
fn pair_group(cwd: &str, mut pids: Vec<u32>, mut matching: Vec<&SessionFile>) -> Vec<AgentSession> {
    pids.sort_unstable();
    matching.sort_by(|a, b| start_order(&a.session.start_time, &b.session.start_time));

    pids.into_iter()
        .enumerate()
        .map(|(i, pid)| match matching.get(i) {
            Some(sf) => AgentSession {
                agent: AgentKind::Gemini,
                status: session_status(&sf.session),
                session_id: sf.session.session_id.clone(),
                title: "-".to_string(),
                directory: cwd.to_string(),
                pid,
                correlation: Correlation::Heuristic,
            },
            None => unmatched(cwd, pid),
        })
        .collect()
}

fn unmatched(directory: &str, pid: u32) -> AgentSession {
    AgentSession {
        agent: AgentKind::Gemini,
        status: AgentStatus::Unknown,
        session_id: String::new(),
        title: "-".to_string(),
        directory: directory.to_string(),
        pid,
        correlation: Correlation::Unmatched,
    }
}

/// Order session start times, RFC 3339-aware with a lexicographic fallback.
fn start_order(a: &str, b: &str) -> Ordering {
    match (
        DateTime::parse_from_rfc3339(a),
        DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(ta), Ok(tb)) => ta.cmp(&tb),
        _ => a.cmp(b),
    }
}

/// Scan {root}/{project}/chats/session-*.json, skipping unreadable files.
fn load_sessions(root: &Path) -> Vec<SessionFile> {
    let Ok(project_dirs) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut sessions = Vec::new();
    for project in project_dirs.flatten() {
        let project_dir = project.path();
        if !project_dir.is_dir() {
            continue;
        }
        let Ok(entries) = fs::read_dir(project_dir.join("chats")) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("session-") || !name.ends_with(".json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(session) = serde_json::from_str::<Session>(&raw) else {
                tracing::debug!(path = %path.display(), "skipping unparsable session file");
                continue;
            };
            sessions.push(SessionFile {
                project_dir: project_dir.clone(),
                session,
            });
        }
    }
    sessions
}

/// A project directory matches a cwd if its .project_root marker names the
/// cwd (or an ancestor of it), or failing that if the basenames agree.
fn project_matches(cwd: &str, project_dir: &Path) -> bool {
    if let Ok(data) = fs::read_to_string(project_dir.join(".project_root")) {
        let root = data.trim();
        if !root.is_empty() && (cwd == root || cwd.starts_with(&format!("{root}/"))) {
            return true;
        }
    }

    let dir_name = project_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let cwd_base = Path::new(cwd)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    !dir_name.is_empty() && dir_name == cwd_base
}

/// Last message type decides: a trailing user message means the agent has
/// not yet responded. No messages means a session awaiting first input.
fn session_status(session: &Session) -> AgentStatus {
    match session.messages.last() {
        Some(message) if message.kind == "user" => AgentStatus::Busy,
        _ => AgentStatus::Idle,
    }
}

fn sessions_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".gemini").join("tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scripted ppid table; all other capabilities are empty.
    struct PpidPlatform(HashMap<u32, u32>);

    impl Platform for PpidPlatform {
        fn find_pids_by_name(&self, _re: &Regex) -> Vec<u32> {
            Vec::new()
        }
        fn find_pids_by_args(&self, _re: &Regex) -> Vec<u32> {
            Vec::new()
        }
        fn list_open_files(&self, _pid: u32) -> Vec<PathBuf> {
            Vec::new()
        }
        fn process_cwd(&self, _pid: u32) -> String {
            "-".to_string()
        }
        fn process_ppid(&self, pid: u32) -> u32 {
            self.0.get(&pid).copied().unwrap_or(0)
        }
        fn listen_tcp(&self) -> Vec<crate::platform::ListenEntry> {
            Vec::new()
        }
    }

    fn session_file(project: &str, id: &str, start: &str, last_kind: Option<&str>) -> SessionFile {
        SessionFile {
            project_dir: PathBuf::from(project),
            session: Session {
                session_id: id.to_string(),
                start_time: start.to_string(),
                messages: last_kind
                    .map(|kind| {
                        vec![SessionMessage {
                            kind: kind.to_string(),
                        }]
                    })
                    .unwrap_or_default(),
            },
        }
    }

    #[test]
    fn children_with_candidate_parents_are_dropped() {
        // 200 is a child of 100; 100's parent (1) is not a candidate.
        let platform = PpidPlatform(HashMap::from([(100, 1), (200, 100), (300, 1)]));
        let parents = filter_parents(&platform, &[100, 200, 300]);
        assert_eq!(parents, vec![100, 300]);
    }

    #[test]
    fn pids_pair_with_sessions_in_creation_order() {
        let t1 = session_file("/p", "sess-early", "2026-03-01T10:00:00Z", Some("user"));
        let t2 = session_file("/p", "sess-late", "2026-03-01T11:30:00Z", Some("gemini"));
        // Deliberately unsorted input on both sides.
        let results = pair_group("/home/dev/p", vec![901, 450], vec![&t2, &t1]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].pid, 450);
        assert_eq!(results[0].session_id, "sess-early");
        assert_eq!(results[0].status, AgentStatus::Busy);
        assert_eq!(results[0].correlation, Correlation::Heuristic);
        assert_eq!(results[1].pid, 901);
        assert_eq!(results[1].session_id, "sess-late");
        assert_eq!(results[1].status, AgentStatus::Idle);
    }

    #[test]
    fn surplus_pids_report_unknown() {
        let t1 = session_file("/p", "only", "2026-03-01T10:00:00Z", None);
        let results = pair_group("/home/dev/p", vec![7, 8], vec![&t1]);

        assert_eq!(results[0].session_id, "only");
        assert_eq!(results[1].status, AgentStatus::Unknown);
        assert_eq!(results[1].session_id, "");
        assert_eq!(results[1].correlation, Correlation::Unmatched);
    }

    #[test]
    fn last_message_type_decides_status() {
        let busy = session_file("/p", "s", "", Some("user"));
        let idle = session_file("/p", "s", "", Some("gemini"));
        let fresh = session_file("/p", "s", "", None);
        assert_eq!(session_status(&busy.session), AgentStatus::Busy);
        assert_eq!(session_status(&idle.session), AgentStatus::Idle);
        assert_eq!(session_status(&fresh.session), AgentStatus::Idle);
    }

    #[test]
    fn start_order_prefers_rfc3339_and_falls_back_to_lexicographic() {
        // Offsets make lexicographic order disagree with chronological order.
        assert_eq!(
            start_order("2026-03-01T12:00:00+02:00", "2026-03-01T11:00:00Z"),
            Ordering::Less
        );
        assert_eq!(start_order("b", "a"), Ordering::Greater);
        assert_eq!(start_order("", ""), Ordering::Equal);
    }

    #[test]
    fn project_root_marker_beats_basename() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("hashed-name");
        fs::create_dir_all(&project).unwrap();
        fs::write(project.join(".project_root"), "/home/dev/actual\n").unwrap();

        assert!(project_matches("/home/dev/actual", &project));
        assert!(project_matches("/home/dev/actual/sub", &project));
        assert!(!project_matches("/home/dev/actually", &project));
        assert!(!project_matches("/home/dev/other", &project));
    }

    #[test]
    fn basename_equality_is_the_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("myapp");
        fs::create_dir_all(&project).unwrap();

        assert!(project_matches("/home/dev/myapp", &project));
        assert!(!project_matches("/home/dev/otherapp", &project));
    }

    #[test]
    fn sessions_load_from_chats_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let chats = dir.path().join("proj").join("chats");
        fs::create_dir_all(&chats).unwrap();
        fs::write(
            chats.join("session-1.json"),
            "{\"sessionId\":\"abc\",\"startTime\":\"2026-03-01T10:00:00Z\",\"messages\":[]}",
        )
        .unwrap();
        fs::write(chats.join("other.json"), "{}").unwrap();
        fs::write(chats.join("session-bad.json"), "{broken").unwrap();

        let sessions = load_sessions(dir.path());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.session_id, "abc");
    }
}
