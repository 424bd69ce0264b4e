//! Blocking invocation of external tools with bounded runtime.

use crate::shutdown::Shutdown;
use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use std::{env, fs};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const READER_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// How long readers get to hit EOF once the tool's group has been killed.
const READER_GRACE: Duration = Duration::from_secs(1);

/// One external program call: the program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// What a finished tool left behind.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr; sox writes its `stat` report to stderr.
    pub fn combined(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }

    /// Exit code, or "signal" when the child was killed.
    pub fn status_label(&self) -> String {
        self.status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} did not finish within {}s", timeout.as_secs())]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} interrupted by shutdown")]
    Cancelled { program: String },
    #[error("waiting on {program} failed: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run `invocation` to completion, killing it after `timeout` or when `shutdown` trips.
///
/// The tool runs in its own process group so anything it forks is killed with it, and
/// the same deadline bounds the wait for its output pipes to close.
pub fn run_tool(
    invocation: &Invocation,
    timeout: Duration,
    shutdown: &Shutdown,
) -> Result<ToolOutput, ToolError> {
    let program = invocation.program.clone();
    debug!(command = %invocation, timeout_s = timeout.as_secs(), "running tool");

    let started = Instant::now();
    let deadline = started + timeout;
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);
    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
        program: program.clone(),
        source,
    })?;

    // Drain both pipes off-thread so a chatty tool cannot block on a full pipe.
    let readers = [drain(child.stdout.take()), drain(child.stderr.take())];

    let status = loop {
        if shutdown.is_requested() {
            reap(&mut child, &program);
            return Err(ToolError::Cancelled { program });
        }
        if Instant::now() >= deadline {
            reap(&mut child, &program);
            return Err(ToolError::TimedOut { program, timeout });
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => {
                reap(&mut child, &program);
                return Err(ToolError::Wait { program, source });
            }
        }
    };

    // Something the tool left behind still holds its stdout/stderr open.
    if !wait_for_readers(&readers, deadline, shutdown) {
        warn!(
            program = %program,
            "tool exited but its output is still held open; killing its process group"
        );
        kill_group(&child, &program);
        if !wait_for_readers(&readers, Instant::now() + READER_GRACE, &Shutdown::new()) {
            warn!(program = %program, "abandoning tool output readers");
        }
    }

    let [stdout, stderr] = readers;
    let output = ToolOutput {
        status,
        stdout: collect(stdout),
        stderr: collect(stderr),
        elapsed: started.elapsed(),
    };
    debug!(
        program = %program,
        status = %output.status_label(),
        elapsed_ms = output.elapsed.as_millis() as u64,
        "tool finished"
    );
    Ok(output)
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

/// True once every reader hit EOF; false at `deadline` or on shutdown.
fn wait_for_readers(
    readers: &[Option<JoinHandle<Vec<u8>>>],
    deadline: Instant,
    shutdown: &Shutdown,
) -> bool {
    loop {
        if readers.iter().flatten().all(JoinHandle::is_finished) {
            return true;
        }
        if shutdown.is_requested() || Instant::now() >= deadline {
            return false;
        }
        thread::sleep(READER_POLL_INTERVAL);
    }
}

/// Output of a finished reader; an unfinished one is dropped rather than joined.
fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .filter(JoinHandle::is_finished)
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// SIGKILL the tool's whole process group. The group id is the child's pid.
#[cfg(unix)]
fn kill_group(child: &Child, program: &str) {
    // SAFETY: killpg(2) takes plain integers; the group was created for this child.
    let rc = unsafe { libc::killpg(child.id() as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(program, error = %err, "failed to kill tool process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_child: &Child, _program: &str) {}

fn reap(child: &mut Child, program: &str) {
    kill_group(child, program);
    if let Err(err) = child.kill() {
        if err.kind() != std::io::ErrorKind::InvalidInput {
            warn!(program, error = %err, "failed to kill tool");
        }
    }
    let _ = child.wait();
}

/// Locate `program`: explicit paths must be executable files, bare names are looked up
/// on `PATH`.
pub fn resolve_program(program: &str) -> Option<PathBuf> {
    let path = Path::new(program);
    if path.is_absolute() || program.contains(std::path::MAIN_SEPARATOR) {
        return is_executable(path).then(|| path.to_path_buf());
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn captures_both_streams_and_status() {
        let out = run_tool(
            &sh("echo out; echo err 1>&2; exit 3"),
            Duration::from_secs(5),
            &Shutdown::new(),
        )
        .expect("run sh");
        assert!(!out.success());
        assert_eq!(out.status_label(), "3");
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(out.combined().contains("out\nerr"));
    }

    #[test]
    fn kills_tool_after_timeout() {
        let started = Instant::now();
        let err = run_tool(&sh("sleep 5"), Duration::from_millis(200), &Shutdown::new())
            .expect_err("should time out");
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn shutdown_cancels_running_tool() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            trigger.request();
        });
        let err = run_tool(&sh("sleep 5"), Duration::from_secs(10), &shutdown)
            .expect_err("should be cancelled");
        handle.join().expect("join trigger");
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn background_child_holding_pipes_does_not_outlive_timeout() {
        let started = Instant::now();
        let out = run_tool(&sh("sleep 5 & exit 0"), Duration::from_millis(500), &Shutdown::new())
            .expect("tool itself exits cleanly");
        assert!(out.success());
        assert!(
            started.elapsed() < Duration::from_secs(3),
            "took {:?}",
            started.elapsed()
        );
    }

    #[cfg(unix)]
    #[test]
    fn timeout_kills_work_the_tool_started() {
        let marker = std::env::temp_dir().join(format!(
            "noisewatch_orphan_marker_{}",
            std::process::id()
        ));
        let _ = fs::remove_file(&marker);
        let script = format!("(sleep 1; touch '{}'); exit 0", marker.display());
        let err = run_tool(&sh(&script), Duration::from_millis(200), &Shutdown::new())
            .expect_err("should time out");
        assert!(matches!(err, ToolError::TimedOut { .. }));
        thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists(), "subshell survived the timeout");
        let _ = fs::remove_file(&marker);
    }

    #[test]
    fn spawn_failure_is_reported() {
        let err = run_tool(
            &Invocation::new("/nonexistent/noisewatch-tool"),
            Duration::from_secs(1),
            &Shutdown::new(),
        )
        .expect_err("spawn should fail");
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn resolve_program_finds_sh_on_path() {
        assert!(resolve_program("sh").is_some());
        assert!(resolve_program("definitely-not-a-real-tool-name").is_none());
        assert!(resolve_program("/nonexistent/tool").is_none());
    }

    #[test]
    fn invocation_display_joins_args() {
        let inv = Invocation::new("sox").args(["-t", ".wav", "a.wav", "-n", "stat"]);
        assert_eq!(inv.to_string(), "sox -t .wav a.wav -n stat");
    }
}
