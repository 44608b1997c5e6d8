//! Amp discoverer.
//!
//! Amp runs under a generic interpreter (`node ... /amp`), so candidates are
//! found by argument matching. Thread files declare the workspace roots they
//! were opened against; a process is matched to the thread whose root
//! contains its working directory — a heuristic, not a proven identity.
//!
//! Thread files: ~/.local/share/amp/threads/*.json

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::data::{AgentKind, AgentSession, AgentStatus, Correlation};
use crate::platform::Platform;
use crate::probe::probe_all;
use crate::util::uri_to_path;

static AMP_ARG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|/)amp$").unwrap());

/// Parsed thread file with its mtime for tie-breaking.
#[derive(Debug, Clone)]
struct ThreadFile {
    path: PathBuf,
    modified: SystemTime,
    thread: Thread,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Thread {
    #[serde(default)]
    env: ThreadEnv,
    #[serde(default)]
    messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ThreadEnv {
    #[serde(default)]
    initial: ThreadInitial,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ThreadInitial {
    #[serde(default)]
    trees: Vec<WorkspaceTree>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WorkspaceTree {
    #[serde(rename = "displayName", default)]
    display_name: String,
    #[serde(default)]
    uri: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    state: MessageState,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MessageState {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "stopReason", default)]
    stop_reason: String,
}

/// Find all running Amp processes and determine their status.
pub async fn discover(platform: &dyn Platform) -> Vec<AgentSession> {
    let pids = platform.find_pids_by_args(&AMP_ARG_RE);
    if pids.is_empty() {
        return Vec::new();
    }

    let threads = match threads_dir() {
        Some(dir) => load_threads(&dir),
        None => Vec::new(),
    };

    if threads.is_empty() {
        // Processes without any thread corpus are still reportable, just
        // unknowable.
        return probe_all(pids, |pid| async move {
            Some(unmatched(pid, platform.process_cwd(pid)))
        })
        .await;
    }

    let threads = &threads;
    probe_all(pids, |pid| async move { probe_pid(platform, pid, threads) }).await
}

fn probe_pid(platform: &dyn Platform, pid: u32, threads: &[ThreadFile]) -> Option<AgentSession> {
    let cwd = platform.process_cwd(pid);
    if cwd.is_empty() || cwd == "-" {
        return None;
    }

    let Some(matched) = match_thread_by_cwd(&cwd, threads) else {
        return Some(unmatched(pid, cwd));
    };

    let session_id = matched
        .path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string();
    let title = matched
        .thread
        .env
        .initial
        .trees
        .first()
        .map(|tree| tree.display_name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "-".to_string());

    Some(AgentSession {
        agent: AgentKind::Amp,
        status: thread_status(&matched.thread),
        session_id,
        title,
        directory: cwd,
        pid,
        correlation: Correlation::Heuristic,
    })
}

fn unmatched(pid: u32, directory: String) -> AgentSession {
    AgentSession {
        agent: AgentKind::Amp,
        status: AgentStatus::Unknown,
        session_id: String::new(),
        title: "-".to_string(),
        directory,
        pid,
        correlation: Correlation::Unmatched,
    }
}

/// Parse every thread file in the directory, skipping unreadable ones.
fn load_threads(dir: &Path) -> Vec<ThreadFile> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut threads = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|ext| ext != "json").unwrap_or(true) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        if meta.is_dir() {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        let Ok(raw) = fs::read_to_string(&path) else {
            continue;
        };
        let Ok(thread) = serde_json::from_str::<Thread>(&raw) else {
            tracing::debug!(path = %path.display(), "skipping unparsable thread file");
            continue;
        };
        threads.push(ThreadFile {
            path,
            modified,
            thread,
        });
    }
    threads
}

/// Find the thread whose workspace tree contains `cwd`. When several match,
/// the most recently modified thread wins.
fn match_thread_by_cwd<'a>(cwd: &str, threads: &'a [ThreadFile]) -> Option<&'a ThreadFile> {
    let mut sorted: Vec<&ThreadFile> = threads.iter().collect();
    sorted.sort_by(|a, b| b.modified.cmp(&a.modified));

    sorted.into_iter().find(|tf| {
        tf.thread.env.initial.trees.iter().any(|tree| {
            match uri_to_path(&tree.uri) {
                Some(root) => cwd == root || cwd.starts_with(&format!("{root}/")),
                None => false,
            }
        })
    })
}

/// Status from the last assistant-authored message.
///
/// | state.type    | stopReason | status |
/// |---------------|------------|--------|
/// | "streaming"   | —          | busy   |
/// | "complete"    | "tool_use" | busy   |
/// | "complete"    | other      | idle   |
/// | anything else | —          | idle   |
///
/// No assistant message at all means a new, unstarted thread: idle.
fn thread_status(thread: &Thread) -> AgentStatus {
    for message in thread.messages.iter().rev() {
        if message.role != "assistant" {
            continue;
        }
        return state_status(&message.state);
    }
    AgentStatus::Idle
}

fn state_status(state: &MessageState) -> AgentStatus {
    match state.kind.as_str() {
        "streaming" => AgentStatus::Busy,
        "complete" if state.stop_reason == "tool_use" => AgentStatus::Busy,
        _ => AgentStatus::Idle,
    }
}

fn threads_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".local")
            .join("share")
            .join("amp")
            .join("threads")
    })
}
