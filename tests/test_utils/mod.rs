//! Shared test doubles for discoverer integration tests.

use regex::Regex;
use spyglass::platform::{ListenEntry, Platform};
use std::collections::HashMap;
use std::path::PathBuf;

/// A scripted platform for exercising discoverers without touching the host.
#[derive(Debug, Default)]
pub struct MockPlatform {
    pub argv: HashMap<u32, Vec<String>>,
    pub open_files: HashMap<u32, Vec<PathBuf>>,
    pub cwds: HashMap<u32, String>,
    pub ppids: HashMap<u32, u32>,
    pub listeners: Vec<ListenEntry>,
}

impl Platform for MockPlatform {
    fn find_pids_by_name(&self, re: &Regex) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .argv
            .iter()
            .filter(|(_, argv)| argv.first().is_some_and(|arg| re.is_match(arg)))
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn find_pids_by_args(&self, re: &Regex) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .argv
            .iter()
            .filter(|(_, argv)| argv.iter().any(|arg| re.is_match(arg)))
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    fn list_open_files(&self, pid: u32) -> Vec<PathBuf> {
        self.open_files.get(&pid).cloned().unwrap_or_default()
    }

    fn process_cwd(&self, pid: u32) -> String {
        self.cwds
            .get(&pid)
            .cloned()
            .unwrap_or_else(|| "-".to_string())
    }

    fn process_ppid(&self, pid: u32) -> u32 {
        self.ppids.get(&pid).copied().unwrap_or(0)
    }

    fn listen_tcp(&self) -> Vec<ListenEntry> {
        self.listeners.clone()
    }
}
