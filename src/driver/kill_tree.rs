//! Process tree termination.
//!
//! The driver spawns a browser, which spawns its own helpers. Killing only
//! the driver would orphan them, so descendants are found from a process
//! table snapshot and killed leaves first.
//!
//! | Platform | Enumeration | Kill |
//! |----------|-------------|------|
//! | Linux | `/proc/<pid>/status` | `SIGKILL` |
//! | Other Unix | `ps -A -o pid=,ppid=` | `SIGKILL` |
//! | Windows | `Win32_Process` via PowerShell | `taskkill /F` |

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

// ============================================================================
// Types
// ============================================================================

/// One row of the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcessEntry {
    pid: u32,
    ppid: u32,
}

// ============================================================================
// Public API
// ============================================================================

/// Returns every descendant of `root`, leaves first.
///
/// Returns an empty list if the process table cannot be read.
#[must_use]
pub fn descendants(root: u32) -> Vec<u32> {
    match enumerate_processes() {
        Ok(table) => find_descendants(root, &table),
        Err(e) => {
            warn!(root, error = %e, "Failed to enumerate processes");
            Vec::new()
        }
    }
}

/// Force-kills every descendant of `root`, leaves first.
///
/// Processes that exit before being signalled are skipped silently.
/// Returns the number of processes signalled.
pub fn kill_descendants(root: u32) -> usize {
    let targets = descendants(root);
    if targets.is_empty() {
        trace!(root, "No descendant processes");
        return 0;
    }

    debug!(root, count = targets.len(), "Killing descendant processes");
    targets.into_iter().filter(|&pid| force_kill(pid)).count()
}

/// Asks a process to exit with `SIGTERM`.
#[cfg(unix)]
pub fn terminate(pid: u32) -> bool {
    send_signal(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Windows has no graceful equivalent for console children, so this is a
/// forced kill.
#[cfg(windows)]
pub fn terminate(pid: u32) -> bool {
    force_kill(pid)
}

// ============================================================================
// Tree Walk
// ============================================================================

/// BFS from `root` over the parent map, reversed so leaves come first.
fn find_descendants(root: u32, table: &[ProcessEntry]) -> Vec<u32> {
    let mut children: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    for entry in table {
        children.entry(entry.ppid).or_default().push(entry.pid);
    }

    let mut found = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(pid) = queue.pop_front() {
        let Some(kids) = children.get(&pid) else {
            continue;
        };
        for &child in kids {
            if child == root || child == pid || found.contains(&child) {
                continue;
            }
            found.push(child);
            queue.push_back(child);
        }
    }

    found.reverse();
    found
}

// ============================================================================
// Enumeration
// ============================================================================

#[cfg(target_os = "linux")]
fn enumerate_processes() -> std::io::Result<Vec<ProcessEntry>> {
    use std::fs;

    let mut table = Vec::new();
    for entry in fs::read_dir("/proc")?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) else {
            continue;
        };
        // Process may have exited since read_dir.
        let Ok(status) = fs::read_to_string(entry.path().join("status")) else {
            continue;
        };
        let ppid = status
            .lines()
            .find_map(|line| line.strip_prefix("PPid:"))
            .and_then(|v| v.trim().parse().ok());
        if let Some(ppid) = ppid {
            table.push(ProcessEntry { pid, ppid });
        }
    }
    Ok(table)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn enumerate_processes() -> std::io::Result<Vec<ProcessEntry>> {
    let output = std::process::Command::new("ps")
        .args(["-A", "-o", "pid=,ppid="])
        .output()?;
    Ok(parse_pid_pairs(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(windows)]
fn enumerate_processes() -> std::io::Result<Vec<ProcessEntry>> {
    let output = std::process::Command::new("powershell")
        .args([
            "-NoProfile",
            "-NonInteractive",
            "-Command",
            "Get-CimInstance Win32_Process | ForEach-Object { \"$($_.ProcessId) $($_.ParentProcessId)\" }",
        ])
        .output()?;
    Ok(parse_pid_pairs(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `<pid> <ppid>` lines, skipping anything malformed.
#[cfg_attr(target_os = "linux", allow(dead_code))]
fn parse_pid_pairs(text: &str) -> Vec<ProcessEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            Some(ProcessEntry { pid, ppid })
        })
        .collect()
}

// ============================================================================
// Signalling
// ============================================================================

#[cfg(unix)]
fn force_kill(pid: u32) -> bool {
    send_signal(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: nix::sys::signal::Signal) -> bool {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 1 {
        warn!(pid, "Refusing to signal protected pid");
        return false;
    }

    match nix::sys::signal::kill(Pid::from_raw(raw), signal) {
        Ok(()) => {
            trace!(pid, ?signal, "Signal sent");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            warn!(pid, ?signal, error = %e, "Failed to signal process");
            false
        }
    }
}

#[cfg(windows)]
fn force_kill(pid: u32) -> bool {
    use std::process::{Command, Stdio};

    Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pid: u32, ppid: u32) -> ProcessEntry {
        ProcessEntry { pid, ppid }
    }

    #[test]
    fn test_find_descendants_leaves_first() {
        let table = [
            entry(10, 1),
            entry(11, 10),
            entry(12, 10),
            entry(13, 11),
            entry(20, 1),
        ];
        let found = find_descendants(10, &table);

        assert_eq!(found.len(), 3);
        assert!(!found.contains(&20));
        let pos = |pid| found.iter().position(|&p| p == pid).expect("present");
        assert!(pos(13) < pos(11), "grandchild must precede its parent");
    }

    #[test]
    fn test_find_descendants_none() {
        assert!(find_descendants(99, &[entry(10, 1)]).is_empty());
    }

    #[test]
    fn test_find_descendants_ignores_cycles() {
        let table = [entry(10, 11), entry(11, 10), entry(12, 12)];
        assert_eq!(find_descendants(10, &table), vec![11]);
    }

    #[test]
    fn test_parse_pid_pairs() {
        let parsed = parse_pid_pairs("  1     0\n 42   1\ngarbage\n7\n");
        assert_eq!(parsed, vec![entry(1, 0), entry(42, 1)]);
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_descendants_of_real_tree() {
        use std::process::Command;
        use std::thread;
        use std::time::Duration;

        let mut parent = Command::new("sh")
            .args(["-c", "sleep 30 & sleep 30 & wait"])
            .spawn()
            .expect("spawn sh");
        let root = parent.id();

        let mut found = Vec::new();
        for _ in 0..50 {
            found = descendants(root);
            if found.len() >= 2 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        assert!(found.len() >= 2, "expected two sleep children, got {found:?}");

        assert!(kill_descendants(root) >= 2);
        // `wait` returns once both children are gone.
        let status = parent.wait().expect("wait");
        assert!(status.code().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_missing_process() {
        assert!(!terminate(u32::MAX / 2));
        assert!(!terminate(1));
    }
}
