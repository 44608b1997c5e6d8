//! Linux introspection backed by the /proc pseudo-filesystem, with `ss` for
//! the listening-socket snapshot.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use super::{ListenEntry, Platform};

/// ss -tlnp process annotation:
/// `LISTEN 0 4096 0.0.0.0:38129 0.0.0.0:* users:(("opencode",pid=1059916,fd=30))`
static SS_LISTEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":(\d+)\s+\S+\s+users:\(\("([^"]+)",pid=(\d+),"#).unwrap());

#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    fn find_pids_by_name(&self, re: &Regex) -> Vec<u32> {
        scan_cmdlines(|argv| argv.first().is_some_and(|arg| re.is_match(arg)))
    }

    fn find_pids_by_args(&self, re: &Regex) -> Vec<u32> {
        scan_cmdlines(|argv| argv.iter().any(|arg| re.is_match(arg)))
    }

    fn list_open_files(&self, pid: u32) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(format!("/proc/{pid}/fd")) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| fs::read_link(entry.path()).ok())
            .collect()
    }

    fn process_cwd(&self, pid: u32) -> String {
        fs::read_link(format!("/proc/{pid}/cwd"))
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "-".to_string())
    }

    fn process_ppid(&self, pid: u32) -> u32 {
        fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| parse_stat_ppid(&stat))
            .unwrap_or(0)
    }

    fn listen_tcp(&self) -> Vec<ListenEntry> {
        let Ok(output) = Command::new("ss").args(["-tlnp"]).output() else {
            return Vec::new();
        };
        if !output.status.success() {
            return Vec::new();
        }
        parse_ss_listen(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Scan /proc/*/cmdline and return PIDs whose NUL-delimited argv satisfies
/// the predicate. Processes that exit mid-scan are skipped.
fn scan_cmdlines(matches: impl Fn(&[&str]) -> bool) -> Vec<u32> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut pids = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(pid) = name.to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(raw) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let data = String::from_utf8_lossy(&raw);
        let argv: Vec<&str> = data.split('\0').collect();
        if matches(&argv) {
            pids.push(pid);
        }
    }
    pids
}

/// PPID is the second field after the parenthesised comm, which may itself
/// contain spaces and parens.
fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let (_, rest) = stat.rsplit_once(')')?;
    rest.split_whitespace().nth(1)?.parse().ok()
}

fn parse_ss_listen(output: &str) -> Vec<ListenEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let Some(caps) = SS_LISTEN_RE.captures(line) else {
            continue;
        };
        let Ok(port) = caps[1].parse::<u16>() else {
            continue;
        };
        let Ok(pid) = caps[3].parse::<u32>() else {
            continue;
        };
        if port > 0 && pid > 0 {
            entries.push(ListenEntry {
                port,
                pid,
                cmd: caps[2].to_string(),
            });
        }
    }
    entries
}
