//! Pid file used by `--kill` to find the running detector.

use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Removes the pid file when dropped, if it still names this process.
#[derive(Debug)]
pub struct PidFileGuard {
    path: PathBuf,
    pid: u32,
}

impl PidFileGuard {
    /// Claim `path` for this process. Fails while the pid already recorded there is alive.
    pub fn create(path: &Path) -> Result<Self> {
        let pid = std::process::id();
        if let Ok(previous) = read_pid(path) {
            if previous != pid && process_alive(previous) {
                bail!(
                    "noisewatch is already running as pid {previous} ('{}'); stop it with --kill",
                    path.display()
                );
            }
            debug!(path = %path.display(), stale = previous, "replacing stale pid file");
        }
        fs::write(path, format!("{pid}\n"))
            .with_context(|| format!("failed to write pid file '{}'", path.display()))?;
        debug!(path = %path.display(), pid, "pid file written");
        Ok(Self {
            path: path.to_path_buf(),
            pid,
        })
    }
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        // A newer instance may have taken over the file; leave it alone then.
        if read_pid(&self.path).ok() == Some(self.pid) {
            if let Err(err) = fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %err, "failed to remove pid file");
            }
        }
    }
}

pub fn read_pid(path: &Path) -> Result<u32> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read pid file '{}'", path.display()))?;
    let trimmed = raw.trim();
    let pid: u32 = trimmed
        .parse()
        .with_context(|| format!("pid file '{}' holds '{trimmed}'", path.display()))?;
    if pid == 0 || pid > i32::MAX as u32 {
        bail!("pid file '{}' holds invalid pid {pid}", path.display());
    }
    Ok(pid)
}

/// Signal 0 only checks for existence; EPERM still means the pid is taken.
fn process_alive(pid: u32) -> bool {
    // SAFETY: kill(2) with signal 0 performs only the permission and existence checks.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Send SIGTERM to the detector recorded in `path`.
pub fn terminate_running(path: &Path) -> Result<u32> {
    let pid = read_pid(path)?;
    // SAFETY: kill(2) takes plain integers; the pid was range-checked above.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(anyhow!("failed to signal pid {pid}: {err}"));
    }
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn temp_pid(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("noisewatch_{name}_{}.pid", std::process::id()))
    }

    #[test]
    fn guard_writes_and_removes_own_pid() {
        let path = temp_pid("guard");
        {
            let _guard = PidFileGuard::create(&path).expect("create");
            assert_eq!(read_pid(&path).expect("read"), std::process::id());
        }
        assert!(!path.exists());
    }

    #[test]
    fn guard_leaves_foreign_pid_in_place() {
        let path = temp_pid("foreign");
        let guard = PidFileGuard::create(&path).expect("create");
        fs::write(&path, "1\n").expect("overwrite");
        drop(guard);
        assert!(path.exists());
        let _ = fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn refuses_to_replace_a_live_instance() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let path = temp_pid("live");
        fs::write(&path, format!("{}\n", child.id())).expect("write");
        let err = PidFileGuard::create(&path).expect_err("live pid must be kept");
        assert!(err.to_string().contains("already running"), "{err}");
        assert_eq!(read_pid(&path).expect("read"), child.id());
        let _ = child.kill();
        let _ = child.wait();
        let _ = fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[test]
    fn replaces_pid_file_of_exited_instance() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let stale = child.id();
        child.wait().expect("wait");
        let path = temp_pid("stale");
        fs::write(&path, format!("{stale}\n")).expect("write");
        let guard = PidFileGuard::create(&path).expect("stale pid is replaced");
        assert_eq!(read_pid(&path).expect("read"), std::process::id());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn rejects_garbage_pid_files() {
        let path = temp_pid("garbage");
        for contents in ["", "abc", "0", "-5", "99999999999"] {
            fs::write(&path, contents).expect("write");
            assert!(read_pid(&path).is_err(), "'{contents}' should be rejected");
        }
        let _ = fs::remove_file(&path);
        assert!(read_pid(&path).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_running_signals_process() {
        let mut child = Command::new("sleep").arg("30").spawn().expect("spawn sleep");
        let path = temp_pid("kill");
        fs::write(&path, child.id().to_string()).expect("write");
        assert_eq!(terminate_running(&path).expect("kill"), child.id());
        let status = child.wait().expect("wait");
        assert!(!status.success());
        let _ = fs::remove_file(&path);
    }
}
