//! Table and JSON renderers for discovered sessions.

use anyhow::Result;
use unicode_width::UnicodeWidthStr;

use crate::data::AgentSession;
use crate::util::{shorten_home, truncate};

const SESSION_WIDTH: usize = 38;
const TITLE_WIDTH: usize = 28;
const COLUMNS: usize = 6;

/// Render an aligned table, one row per session, header first.
///
/// Column widths are computed from display width so wide glyphs in titles do
/// not skew alignment.
pub fn render_table(sessions: &[AgentSession]) -> String {
    let mut rows: Vec<[String; COLUMNS]> = Vec::with_capacity(sessions.len() + 1);
    rows.push([
        "AGENT".to_string(),
        "STATUS".to_string(),
        "SESSION".to_string(),
        "TITLE".to_string(),
        "DIRECTORY".to_string(),
        "PID".to_string(),
    ]);
    for session in sessions {
        rows.push([
            session.agent.to_string(),
            session.status.to_string(),
            truncate(&session.session_id, SESSION_WIDTH),
            truncate(&session.title, TITLE_WIDTH),
            shorten_home(&session.directory),
            session.pid.to_string(),
        ]);
    }

    let mut widths = [0usize; COLUMNS];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.width());
        }
    }

    let mut out = String::new();
    for row in &rows {
        let mut line = String::new();
        for (i, cell) in row.iter().enumerate() {
            line.push_str(cell);
            if i + 1 < COLUMNS {
                let pad = widths[i].saturating_sub(cell.width()) + 2;
                line.extend(std::iter::repeat(' ').take(pad));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Pretty-printed JSON for machine consumption. Full field values, no
/// truncation or home shortening.
pub fn render_json(sessions: &[AgentSession]) -> Result<String> {
    Ok(serde_json::to_string_pretty(sessions)?)
}
