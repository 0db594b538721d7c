//! Fake clicker scripts for process tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script named `clicker` into `dir`.
pub(crate) fn fake_driver(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("clicker");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// Script body that announces `port` and then idles.
pub(crate) fn announcing(port: u16) -> String {
    format!("echo 'listening on ws://localhost:{port}'\nexec sleep 30")
}

/// Reads a pid written by a fake driver.
pub(crate) fn read_pid(path: &Path) -> i32 {
    std::fs::read_to_string(path)
        .expect("pid file")
        .trim()
        .parse()
        .expect("pid")
}

/// Zombies count as gone; an orphan may wait a while for its reaper.
pub(crate) fn is_running(pid: i32) -> bool {
    if cfg!(target_os = "linux") {
        return std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .and_then(|(_, rest)| rest.split_whitespace().next().map(str::to_owned))
            })
            .is_some_and(|state| state != "Z" && state != "X");
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}
