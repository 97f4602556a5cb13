use std::io;
use std::path::Path;

use crate::process::PID_FILE;

/// What orphan recovery found and removed for one profile directory.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub killed: bool,
    pub removed_locks: usize,
}

/// Browser profile lock files left behind by a crashed session.
const LOCK_FILES: &[&str] = &["SingletonLock", "SingletonCookie", "SingletonSocket"];

/// Reap a leftover host process and unlock its profile directory.
///
/// The pid recorded by a previous spawn is killed together with its
/// process group; a pid that no longer exists is not an error. Lock files
/// must be gone before the browser accepts the profile again.
pub fn cleanup_orphans(profile_dir: &Path) -> io::Result<CleanupReport> {
    let mut report = CleanupReport::default();

    let pid_file = profile_dir.join(PID_FILE);
    if let Ok(contents) = std::fs::read_to_string(&pid_file) {
        if let Ok(pid) = contents.trim().parse::<i32>() {
            report.killed = kill_process_group(pid);
        }
        std::fs::remove_file(&pid_file)?;
    }

    for name in LOCK_FILES {
        let path = profile_dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => report.removed_locks += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

#[cfg(unix)]
fn kill_process_group(pid: i32) -> bool {
    if pid <= 1 {
        return false;
    }
    // The spawn put the host in its own process group, so -pid reaches the
    // browser children as well.
    let group = unsafe { libc::kill(-pid, libc::SIGKILL) } == 0;
    let direct = unsafe { libc::kill(pid, libc::SIGKILL) } == 0;
    group || direct
}

#[cfg(not(unix))]
fn kill_process_group(_pid: i32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn removes_stale_locks_and_pid_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("SingletonLock"), "").unwrap();
        std::fs::write(dir.path().join("SingletonCookie"), "").unwrap();
        // A pid far above any real pid_max: the kill is a no-op.
        std::fs::write(dir.path().join(PID_FILE), "1999999999").unwrap();

        let report = cleanup_orphans(dir.path()).unwrap();

        assert!(!report.killed);
        assert_eq!(report.removed_locks, 2);
        assert!(!dir.path().join("SingletonLock").exists());
        assert!(!dir.path().join(PID_FILE).exists());
    }

    #[test]
    fn clean_profile_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let report = cleanup_orphans(dir.path()).unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[test]
    fn garbage_pid_file_is_removed_without_killing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PID_FILE), "not a pid").unwrap();
        let report = cleanup_orphans(dir.path()).unwrap();
        assert!(!report.killed);
        assert!(!dir.path().join(PID_FILE).exists());
    }
}
