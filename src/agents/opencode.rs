//! OpenCode discoverer.
//!
//! OpenCode instances serve a local HTTP API, so discovery is network-based:
//! find listening sockets owned by an opencode process, then ask each
//! instance for its session status. Each process yields one record.

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::data::{AgentKind, AgentSession, AgentStatus, Correlation};
use crate::platform::{ListenEntry, Platform};
use crate::probe::probe_all;

/// Shared client for local endpoint probes. An unresponsive instance must
/// not stall the collection run, so requests time out fast.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .expect("Failed to create HTTP client")
});

#[derive(Debug, Clone, Copy)]
struct Instance {
    port: u16,
    pid: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct StatusEntry {
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    directory: String,
    #[serde(default)]
    time: SessionTime,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct SessionTime {
    #[serde(default)]
    updated: i64,
}

/// Find all running OpenCode instances and determine their status.
pub async fn discover(platform: &dyn Platform) -> Vec<AgentSession> {
    let instances = find_instances(platform.listen_tcp());
    if instances.is_empty() {
        return Vec::new();
    }
    probe_all(instances, |instance| async move {
        query_instance(instance).await
    })
    .await
}

/// Filter the socket snapshot to opencode listeners, one instance per PID (a
/// single process may bind several ports).
fn find_instances(entries: Vec<ListenEntry>) -> Vec<Instance> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| entry.cmd.eq_ignore_ascii_case("opencode"))
        .filter(|entry| seen.insert(entry.pid))
        .map(|entry| Instance {
            port: entry.port,
            pid: entry.pid,
        })
        .collect()
}

/// Query one instance over its local API.
///
/// When the status map is empty the instance is idle, but we cannot tell
/// which idle session (if any) it is displaying, so no session metadata is
/// reported.
async fn query_instance(instance: Instance) -> Option<AgentSession> {
    let base = format!("http://localhost:{}", instance.port);

    let status_map = fetch_status_map(&base).await;
    if status_map.is_empty() {
        return Some(AgentSession {
            agent: AgentKind::Opencode,
            status: AgentStatus::Idle,
            session_id: String::new(),
            title: "-".to_string(),
            directory: "-".to_string(),
            pid: instance.pid,
            correlation: Correlation::Authoritative,
        });
    }

    let sessions = fetch_session_list(&base).await;
    let (session_id, entry) = select_entry(&status_map, &sessions)?;

    let mut title = "-".to_string();
    let mut directory = "-".to_string();
    if let Some(session) = sessions.iter().find(|s| s.id == *session_id) {
        if !session.title.is_empty() {
            title = session.title.clone();
        }
        if !session.directory.is_empty() {
            directory = session.directory.clone();
        }
    }

    Some(AgentSession {
        agent: AgentKind::Opencode,
        status: AgentStatus::from_wire(&entry.kind),
        session_id: session_id.clone(),
        title,
        directory,
        pid: instance.pid,
        correlation: Correlation::Authoritative,
    })
}

/// Pick the status entry to report. The map's iteration order is
/// unspecified, so an explicit order is imposed: active entries (busy/retry)
/// first, most recently updated next, session id as the final tie-break.
fn select_entry<'a>(
    status_map: &'a HashMap<String, StatusEntry>,
    sessions: &[SessionEntry],
) -> Option<(&'a String, &'a StatusEntry)> {
    let updated: HashMap<&str, i64> = sessions
        .iter()
        .map(|s| (s.id.as_str(), s.time.updated))
        .collect();

    status_map.iter().min_by_key(|(id, entry)| {
        let active = matches!(
            AgentStatus::from_wire(&entry.kind),
            AgentStatus::Busy | AgentStatus::Retry
        );
        let recency = updated.get(id.as_str()).copied().unwrap_or(i64::MIN);
        (!active, std::cmp::Reverse(recency), (*id).clone())
    })
}

/// GET /session/status — session id → status entry. Failures degrade to an
/// empty map, never an error.
async fn fetch_status_map(base: &str) -> HashMap<String, StatusEntry> {
    let request = HTTP_CLIENT.get(format!("{base}/session/status")).send();
    let Ok(response) = request.await else {
        tracing::debug!(%base, "session status endpoint unreachable");
        return HashMap::new();
    };
    response.json().await.unwrap_or_default()
}

/// GET /session — the instance's session list, for title/directory and
/// recency enrichment. Failures degrade to an empty list.
async fn fetch_session_list(base: &str) -> Vec<SessionEntry> {
    let request = HTTP_CLIENT.get(format!("{base}/session")).send();
    let Ok(response) = request.await else {
        tracing::debug!(%base, "session list endpoint unreachable");
        return Vec::new();
    };
    response.json().await.unwrap_or_default()
}
