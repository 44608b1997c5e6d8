//! Per-agent session discoverers.
//!
//! Each discoverer finds candidate processes through the platform capability
//! object, gathers that agent's status artifacts, correlates processes to
//! sessions, and applies a deterministic status rule. Failures never cross
//! discoverer boundaries: the worst outcome for any probe is a dropped or
//! unknown-status record.

pub mod amp;
pub mod claude;
pub mod codex;
pub mod gemini;
pub mod opencode;

use std::collections::HashSet;
use std::future::Future;

use crate::data::{AgentKind, AgentSession};
use crate::platform::Platform;

/// Which agent families a collection run should probe.
///
/// `None` means all agents; an explicit empty selection (every requested name
/// unknown) probes nothing.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter(Option<HashSet<AgentKind>>);

impl AgentFilter {
    /// Parse a comma-separated agent list. Empty input selects all agents;
    /// unknown names are skipped with a warning.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self(None);
        }

        let mut selected = HashSet::new();
        for name in raw.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            match AgentKind::parse(name) {
                Some(kind) => {
                    selected.insert(kind);
                }
                None => {
                    let known: Vec<&str> = AgentKind::all().map(|k| k.as_str()).collect();
                    tracing::warn!("unknown agent {:?} (known: {})", name, known.join(", "));
                }
            }
        }
        Self(Some(selected))
    }

    pub fn enabled(&self, kind: AgentKind) -> bool {
        match &self.0 {
            None => true,
            Some(selected) => selected.contains(&kind),
        }
    }
}

/// Run every enabled discoverer and concatenate results into one flat list.
///
/// Discoverers share no mutable state, so they run concurrently relative to
/// each other; each fans out internally over its own candidates.
pub async fn discover_all(platform: &dyn Platform, filter: &AgentFilter) -> Vec<AgentSession> {
    let (opencode, codex, claude, amp, gemini) = tokio::join!(
        run_if(filter, AgentKind::Opencode, opencode::discover(platform)),
        run_if(filter, AgentKind::Codex, codex::discover(platform)),
        run_if(filter, AgentKind::Claude, claude::discover(platform)),
        run_if(filter, AgentKind::Amp, amp::discover(platform)),
        run_if(filter, AgentKind::Gemini, gemini::discover(platform)),
    );

    let mut sessions = Vec::new();
    sessions.extend(opencode);
    sessions.extend(codex);
    sessions.extend(claude);
    sessions.extend(amp);
    sessions.extend(gemini);
    sessions
}

async fn run_if(
    filter: &AgentFilter,
    kind: AgentKind,
    discover: impl Future<Output = Vec<AgentSession>>,
) -> Vec<AgentSession> {
    if filter.enabled(kind) {
        discover.await
    } else {
        Vec::new()
    }
}
