//! OS process and network introspection.
//!
//! One capability trait, one implementation per OS family. Every operation
//! degrades to an empty or sentinel result instead of failing: a single
//! inaccessible process must never abort discovery of the others.

use regex::Regex;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform as HostPlatform;
#[cfg(target_os = "macos")]
pub use macos::MacosPlatform as HostPlatform;

/// A TCP listening socket observed at a single point in time.
///
/// Valid only for the instant of the system call that produced it; there is
/// no subscription or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenEntry {
    pub port: u16,
    pub pid: u32,
    pub cmd: String,
}

/// Process and network introspection primitives.
pub trait Platform: Send + Sync {
    /// PIDs whose resolved binary path (argv[0]) matches `re`. Later
    /// arguments are never considered.
    fn find_pids_by_name(&self, re: &Regex) -> Vec<u32>;

    /// PIDs where any command-line argument matches `re`. Needed for agents
    /// launched as `node script-path ...` where argv[0] is a generic
    /// interpreter name.
    fn find_pids_by_args(&self, re: &Regex) -> Vec<u32>;

    /// Absolute paths of all open file handles of `pid`. Unreadable handles
    /// are silently skipped.
    fn list_open_files(&self, pid: u32) -> Vec<PathBuf>;

    /// Current working directory of `pid`, or "-" on any failure.
    fn process_cwd(&self, pid: u32) -> String;

    /// Parent PID of `pid`; 0 signals unknown or unavailable.
    fn process_ppid(&self, pid: u32) -> u32;

    /// Snapshot of all TCP sockets in LISTEN state system-wide, annotated
    /// with owning PID and command name where the OS can supply them.
    fn listen_tcp(&self) -> Vec<ListenEntry>;
}

/// Construct the capability object for the current OS.
///
/// Built once at startup and passed to every discoverer; there is no global
/// platform singleton.
pub fn host_platform() -> Box<dyn Platform> {
    Box::new(HostPlatform::default())
}
