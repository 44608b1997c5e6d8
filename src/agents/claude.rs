//! Claude Code discoverer.
//!
//! Correlating a PID to a session is itself inferential: the per-session
//! debug log does not declare its owning PID, but temp-file references inside
//! the log content embed one. Once mapped, status comes from the session
//! transcript's turn markers.
//!
//! Debug logs: ~/.claude/debug/{session-id}.txt
//! Transcripts: ~/.claude/projects/{project}/{session-id}.jsonl

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::data::{AgentKind, AgentSession, AgentStatus, Correlation};
use crate::platform::Platform;
use crate::probe::probe_all;

static CLAUDE_BIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|/)claude$").unwrap());

/// Temp-file references in debug logs look like ".tmp.12345.".
static TMP_PID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.tmp\.(\d+)\.").unwrap());

/// Transcripts beyond this size are scanned only over their trailing window.
const TAIL_WINDOW: u64 = 128 * 1024;

#[derive(Debug, Default, Deserialize)]
struct TranscriptEntry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    subtype: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    cwd: String,
}

/// Result of scanning one transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptScan {
    pub status: AgentStatus,
    pub slug: String,
    pub cwd: String,
}

impl TranscriptScan {
    fn unreadable() -> Self {
        Self {
            status: AgentStatus::Unknown,
            slug: String::new(),
            cwd: String::new(),
        }
    }
}

/// Find all running Claude Code processes and determine their status.
pub async fn discover(platform: &dyn Platform) -> Vec<AgentSession> {
    let pids = platform.find_pids_by_name(&CLAUDE_BIN_RE);
    if pids.is_empty() {
        return Vec::new();
    }

    let pid_map = match debug_dir() {
        Some(dir) => map_pids_to_sessions(&pids, &dir),
        None => HashMap::new(),
    };

    probe_all(pids, |pid| {
        let session_id = pid_map.get(&pid).cloned();
        async move { probe_pid(platform, pid, session_id?) }
    })
    .await
}

/// Build the PID → session-id map from debug logs.
///
/// Logs are scanned newest-modified first so active sessions resolve without
/// reading the whole corpus, and scanning stops once every candidate PID is
/// mapped. A PID left unmapped after all logs is simply unresolved.
pub fn map_pids_to_sessions(pids: &[u32], debug_dir: &Path) -> HashMap<u32, String> {
    let mut mapped = HashMap::new();
    if pids.is_empty() {
        return mapped;
    }
    let Ok(entries) = fs::read_dir(debug_dir) else {
        return mapped;
    };

    let mut logs: Vec<(PathBuf, SystemTime)> = entries
        .flatten()
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "txt")
        })
        .filter_map(|entry| {
            let meta = entry.metadata().ok()?;
            if meta.is_dir() {
                return None;
            }
            Some((entry.path(), meta.modified().ok()?))
        })
        .collect();
    logs.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in logs {
        if mapped.len() == pids.len() {
            break;
        }
        let Some(pid) = scan_log_for_pid(&path, pids, &mapped) else {
            continue;
        };
        let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        mapped.insert(pid, session_id.to_string());
    }
    mapped
}

/// Scan one debug log line-by-line for the first candidate PID not yet
/// mapped.
fn scan_log_for_pid(path: &Path, targets: &[u32], mapped: &HashMap<u32, String>) -> Option<u32> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        let Some(pid) = extract_embedded_pid(&line) else {
            continue;
        };
        if targets.contains(&pid) && !mapped.contains_key(&pid) {
            return Some(pid);
        }
    }
    None
}

/// Extract the first integer embedded as ".tmp.<digits>." in a log line.
///
/// This is the single point of coupling to Claude Code's internal temp-file
/// naming; everything else in discovery only sees the parsed PID.
pub fn extract_embedded_pid(line: &str) -> Option<u32> {
    TMP_PID_RE.captures(line)?.get(1)?.as_str().parse().ok()
}

fn probe_pid(platform: &dyn Platform, pid: u32, session_id: String) -> Option<AgentSession> {
    let transcript = resolve_transcript(&projects_dir()?, &session_id)?;
    let scan = transcript_status(&transcript);

    let title = if scan.slug.is_empty() {
        "-".to_string()
    } else {
        scan.slug
    };
    let directory = if scan.cwd.is_empty() {
        platform.process_cwd(pid)
    } else {
        scan.cwd
    };

    Some(AgentSession {
        agent: AgentKind::Claude,
        status: scan.status,
        session_id,
        title,
        directory,
        pid,
        correlation: Correlation::Authoritative,
    })
}

/// Locate {projects}/*/{session-id}.jsonl.
///
/// A session can appear under more than one project directory if the agent
/// relocated; the most recently modified transcript wins.
pub fn resolve_transcript(projects_dir: &Path, session_id: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(projects_dir).ok()?;

    let mut best: Option<(PathBuf, SystemTime)> = None;
    for entry in entries.flatten() {
        let candidate = entry.path().join(format!("{session_id}.jsonl"));
        let Ok(meta) = candidate.metadata() else {
            continue;
        };
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if best.as_ref().map(|(_, t)| modified > *t).unwrap_or(true) {
            best = Some((candidate, modified));
        }
    }
    best.map(|(path, _)| path)
}

/// Read a transcript and derive status, title slug, and working directory.
///
/// Large files are scanned over the trailing window only; the first line
/// after the seek may be truncated mid-record and is discarded before
/// parsing resumes.
pub fn transcript_status(path: &Path) -> TranscriptScan {
    let Ok(mut file) = File::open(path) else {
        return TranscriptScan::unreadable();
    };
    let Ok(meta) = file.metadata() else {
        return TranscriptScan::unreadable();
    };

    if meta.len() > TAIL_WINDOW {
        if file.seek(SeekFrom::Start(meta.len() - TAIL_WINDOW)).is_err() {
            return TranscriptScan::unreadable();
        }
        let mut reader = BufReader::new(file);
        let mut partial = String::new();
        if reader.read_line(&mut partial).is_err() {
            return TranscriptScan::unreadable();
        }
        scan_transcript(reader)
    } else {
        scan_transcript(BufReader::new(file))
    }
}

/// Forward scan over transcript lines.
///
/// Status is ordering-based, not last-line-based, because the final line may
/// be an unrelated informational entry. Each turn ends with a
/// system/turn_duration entry and assistant entries only appear within a
/// turn, so whichever marker appears later decides.
fn scan_transcript(reader: impl BufRead) -> TranscriptScan {
    let mut last_turn_end: Option<usize> = None;
    let mut last_assistant: Option<usize> = None;
    let mut slug = String::new();
    let mut cwd = String::new();

    for (line_no, line) in reader.lines().map_while(Result::ok).enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<TranscriptEntry>(&line) else {
            continue;
        };

        // Fields accumulate forward; later non-empty values win.
        if !entry.slug.is_empty() {
            slug = entry.slug;
        }
        if !entry.cwd.is_empty() {
            cwd = entry.cwd;
        }

        match entry.kind.as_str() {
            "system" if entry.subtype == "turn_duration" => last_turn_end = Some(line_no),
            "assistant" => last_assistant = Some(line_no),
            _ => {}
        }
    }

    let status = match (last_turn_end, last_assistant) {
        // Neither marker: fresh session awaiting its first input.
        (None, None) => AgentStatus::Idle,
        (turn_end, assistant) if turn_end > assistant => AgentStatus::Idle,
        _ => AgentStatus::Busy,
    };

    TranscriptScan { status, slug, cwd }
}

fn debug_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("debug"))
}

fn projects_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}
