use serde::{Deserialize, Serialize};
use std::fmt;

/// A single discovered agent session.
///
/// Constructed fresh by a discoverer probe, immutable once returned. A record
/// has no identity beyond the collection run that produced it — nothing is
/// persisted and nothing is updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub agent: AgentKind,
    pub status: AgentStatus,
    /// Opaque identifier correlating the process to its persisted
    /// conversation state. Empty when unknowable.
    #[serde(default)]
    pub session_id: String,
    /// Display label, "-" when absent.
    #[serde(default)]
    pub title: String,
    /// Absolute path, "-" when unreadable.
    #[serde(default)]
    pub directory: String,
    pub pid: u32,
    /// How the process was bound to its session artifact.
    pub correlation: Correlation,
}

/// The agent families this tool knows how to probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Opencode,
    Codex,
    Claude,
    Amp,
    Gemini,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opencode => "opencode",
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Amp => "amp",
            Self::Gemini => "gemini",
        }
    }

    /// Parse a user-supplied agent name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "opencode" => Some(Self::Opencode),
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            "amp" => Some(Self::Amp),
            "gemini" => Some(Self::Gemini),
            _ => None,
        }
    }

    /// Iterator over all known agents in display order.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::Opencode,
            Self::Codex,
            Self::Claude,
            Self::Amp,
            Self::Gemini,
        ]
        .into_iter()
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activity state inferred for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Busy,
    Idle,
    Retry,
    #[default]
    Unknown,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Idle => "idle",
            Self::Retry => "retry",
            Self::Unknown => "unknown",
        }
    }

    /// Map a status string reported by an agent's own API to our model.
    /// Anything unrecognised is unknown rather than a guess.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "busy" => Self::Busy,
            "idle" => Self::Idle,
            "retry" => Self::Retry,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a process was bound to its session artifact.
///
/// Codex (UUID in an open file handle), Claude (PID embedded in the debug
/// log), and OpenCode (socket owner) matches are authoritative. Amp
/// (cwd-prefix) and Gemini (positional pairing) are best-effort heuristics,
/// and records emitted for a process with no matched artifact carry
/// `Unmatched` so consumers can tell the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Correlation {
    Authoritative,
    Heuristic,
    Unmatched,
}
