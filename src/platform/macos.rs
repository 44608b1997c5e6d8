//! macOS introspection via the `ps` and `lsof` diagnostic utilities.
//!
//! Semantics mirror the Linux implementation: pattern matching against
//! argv[0] only (or any argument), sentinel results on failure, and an empty
//! snapshot when a utility is missing from the host.

use regex::Regex;
use std::path::PathBuf;
use std::process::Command;

use super::{ListenEntry, Platform};

#[derive(Debug, Default)]
pub struct MacosPlatform;

impl Platform for MacosPlatform {
    fn find_pids_by_name(&self, re: &Regex) -> Vec<u32> {
        ps_processes()
            .into_iter()
            .filter(|(_, cmd)| {
                cmd.split_whitespace()
                    .next()
                    .is_some_and(|argv0| re.is_match(argv0))
            })
            .map(|(pid, _)| pid)
            .collect()
    }

    fn find_pids_by_args(&self, re: &Regex) -> Vec<u32> {
        ps_processes()
            .into_iter()
            .filter(|(_, cmd)| cmd.split_whitespace().any(|arg| re.is_match(arg)))
            .map(|(pid, _)| pid)
            .collect()
    }

    fn list_open_files(&self, pid: u32) -> Vec<PathBuf> {
        let Some(output) = run(Command::new("lsof").args(["-p", &pid.to_string(), "-Fn"])) else {
            return Vec::new();
        };
        // -Fn prefixes each file name with 'n'; keep only absolute paths.
        output
            .lines()
            .filter_map(|line| line.strip_prefix('n'))
            .filter(|name| name.starts_with('/'))
            .map(PathBuf::from)
            .collect()
    }

    fn process_cwd(&self, pid: u32) -> String {
        let Some(output) = run(Command::new("lsof").args([
            "-a",
            "-p",
            &pid.to_string(),
            "-d",
            "cwd",
            "-Fn",
        ])) else {
            return "-".to_string();
        };
        output
            .lines()
            .filter_map(|line| line.strip_prefix('n'))
            .find(|name| name.starts_with('/'))
            .map(str::to_string)
            .unwrap_or_else(|| "-".to_string())
    }

    fn process_ppid(&self, pid: u32) -> u32 {
        run(Command::new("ps").args(["-o", "ppid=", "-p", &pid.to_string()]))
            .and_then(|out| out.trim().parse().ok())
            .unwrap_or(0)
    }

    fn listen_tcp(&self) -> Vec<ListenEntry> {
        let Some(output) = run(Command::new("lsof").args([
            "-iTCP",
            "-sTCP:LISTEN",
            "-nP",
            "-Fpcn",
        ])) else {
            return Vec::new();
        };
        parse_lsof_listen(&output)
    }
}

/// Run a diagnostic utility, returning stdout on success and None when the
/// utility is missing or exits nonzero.
fn run(command: &mut Command) -> Option<String> {
    let output = command.output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `ps ax -o pid,command` rows as (pid, command-with-args), whitespace-split.
fn ps_processes() -> Vec<(u32, String)> {
    let Some(output) = run(Command::new("ps").args(["ax", "-o", "pid,command"])) else {
        return Vec::new();
    };
    parse_ps_output(&output)
}

fn parse_ps_output(output: &str) -> Vec<(u32, String)> {
    let mut processes = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        let Some((pid_field, cmd)) = line.split_once(' ') else {
            continue;
        };
        let Ok(pid) = pid_field.trim().parse::<u32>() else {
            continue;
        };
        processes.push((pid, cmd.trim().to_string()));
    }
    processes
}

/// lsof -Fpcn emits grouped records:
///   p<PID>      — new process group
///   c<command>  — command name
///   n<name>     — network name ("*:8080", "127.0.0.1:3000")
/// A single PID may carry several 'n' lines (multiple listening ports).
fn parse_lsof_listen(output: &str) -> Vec<ListenEntry> {
    let mut entries = Vec::new();
    let mut cur_pid: u32 = 0;
    let mut cur_cmd = String::new();

    for line in output.lines() {
        let mut chars = line.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        let rest = chars.as_str();
        match first {
            'p' => cur_pid = rest.parse().unwrap_or(0),
            'c' => cur_cmd = rest.to_string(),
            'n' => {
                let Some((_, port_field)) = rest.rsplit_once(':') else {
                    continue;
                };
                let Ok(port) = port_field.parse::<u16>() else {
                    continue;
                };
                if port > 0 && cur_pid > 0 {
                    entries.push(ListenEntry {
                        port,
                        pid: cur_pid,
                        cmd: cur_cmd.clone(),
                    });
                }
            }
            _ => {}
        }
    }
    entries
}
