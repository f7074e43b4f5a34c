//! A started daemon process and how it is taken down.

use crate::procs::{KILL_GRACE, POLL_INTERVAL, PROCS, send_signal};
use crate::shell::Shell;
use indexmap::{IndexMap, IndexSet};
use nix::sys::signal::Signal;
use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Upper bound on captured output per stream; older bytes are dropped.
const CAPTURE_LIMIT: usize = 1024 * 1024;

/// Where a daemon's stdout or stderr goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Sink {
    /// Captured in memory, see [`CapturedOutput`].
    #[default]
    Pipe,
    /// Appended to a file, created along with its parent directories.
    File(PathBuf),
    Null,
}

impl Sink {
    fn open(&self) -> io::Result<Stdio> {
        match self {
            Sink::Pipe => Ok(Stdio::piped()),
            Sink::Null => Ok(Stdio::null()),
            Sink::File(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Stdio::from(file))
            }
        }
    }
}

impl From<PathBuf> for Sink {
    fn from(path: PathBuf) -> Self {
        Sink::File(path)
    }
}

/// Options applied when a daemon process is launched.
///
/// Unset fields fall back to the configured options of the runner when
/// merged; see [`LaunchOptions::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub dir: Option<PathBuf>,
    pub env: IndexMap<String, String>,
    pub stdout: Option<Sink>,
    pub stderr: Option<Sink>,
    pub shell: Option<Shell>,
}

impl LaunchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdout(mut self, sink: impl Into<Sink>) -> Self {
        self.stdout = Some(sink.into());
        self
    }

    pub fn stderr(mut self, sink: impl Into<Sink>) -> Self {
        self.stderr = Some(sink.into());
        self
    }

    pub fn shell(mut self, shell: Shell) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win and
    /// environment maps merge key by key.
    pub fn merge(&self, overrides: &LaunchOptions) -> LaunchOptions {
        let mut env = self.env.clone();
        env.extend(overrides.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        LaunchOptions {
            dir: overrides.dir.clone().or_else(|| self.dir.clone()),
            env,
            stdout: overrides.stdout.clone().or_else(|| self.stdout.clone()),
            stderr: overrides.stderr.clone().or_else(|| self.stderr.clone()),
            shell: overrides.shell.or(self.shell),
        }
    }
}

/// In-memory copy of whatever a daemon wrote to piped stdout/stderr.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn stdout(&self) -> Vec<u8> {
        lock(&self.stdout).clone()
    }

    pub fn stderr(&self) -> Vec<u8> {
        lock(&self.stderr).clone()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&lock(&self.stdout)).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&lock(&self.stderr)).into_owned()
    }
}

fn lock(buf: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buf.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Copy `reader` into `buf` until EOF on a background thread, so the
/// daemon never blocks on a full pipe.
fn drain<R: Read + Send + 'static>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    std::thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    let mut buf = lock(&buf);
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.len() > CAPTURE_LIMIT {
                        let excess = buf.len() - CAPTURE_LIMIT;
                        buf.drain(..excess);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// A daemon process started by a [`DaemonRunner`](crate::runner::DaemonRunner).
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    child_pids: IndexSet<u32>,
    output: CapturedOutput,
}

impl ProcessHandle {
    /// Spawn `command` with the sinks, directory and environment of `launch`.
    pub(crate) fn spawn(mut command: Command, launch: &LaunchOptions) -> io::Result<Self> {
        command
            .stdin(Stdio::null())
            .stdout(launch.stdout.clone().unwrap_or_default().open()?)
            .stderr(launch.stderr.clone().unwrap_or_default().open()?);
        if let Some(dir) = &launch.dir {
            command.current_dir(dir);
        }
        command.envs(&launch.env);

        let mut child = command.spawn()?;
        let output = CapturedOutput::default();
        if let Some(stdout) = child.stdout.take() {
            drain(stdout, Arc::clone(&output.stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            drain(stderr, Arc::clone(&output.stderr));
        }
        Ok(Self {
            pid: child.id(),
            child,
            child_pids: IndexSet::new(),
            output,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Descendants recorded by the last [`capture_children`](Self::capture_children).
    pub fn child_pids(&self) -> &IndexSet<u32> {
        &self.child_pids
    }

    pub fn output(&self) -> &CapturedOutput {
        &self.output
    }

    /// Record the current descendants of this process, deepest first.
    ///
    /// Must happen before the process is signaled: once it exits, its
    /// children are reparented and can no longer be found through it.
    pub fn capture_children(&mut self) -> &IndexSet<u32> {
        self.child_pids.extend(PROCS.all_children(self.pid));
        &self.child_pids
    }

    /// True if the process exited, is a zombie, or cannot be looked up.
    pub fn is_dead(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) | Err(_) => true,
            Ok(None) => !PROCS.is_running(self.pid),
        }
    }

    /// Terminate the captured children, then this process.
    pub fn shutdown(mut self, timeout: Duration) -> CapturedOutput {
        for pid in std::mem::take(&mut self.child_pids) {
            if pid != self.pid {
                PROCS.terminate(pid, timeout);
            }
        }
        self.terminate(timeout);
        self.output
    }

    /// SIGTERM, wait up to `timeout`, then SIGKILL. Children are left alone.
    pub fn terminate(&mut self, timeout: Duration) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("pid {} already exited with {status}", self.pid);
                return;
            }
            Err(e) => {
                debug!("could not query pid {}: {e}", self.pid);
                return;
            }
            Ok(None) => {}
        }
        send_signal(self.pid, Signal::SIGTERM);
        if self.wait(timeout) {
            return;
        }
        warn!(
            "process {} did not exit within {timeout:?} after SIGTERM, sending SIGKILL",
            self.pid
        );
        if let Err(e) = self.child.kill() {
            debug!("failed to kill pid {}: {e}", self.pid);
        }
        if !self.wait(KILL_GRACE) {
            error!("process {} is still running after SIGKILL", self.pid);
        }
    }

    /// Reap the process, polling until `timeout`. True once it exited.
    fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) | Err(_) => return true,
                Ok(None) => {}
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_merge_prefers_overrides() {
        let configured = LaunchOptions::new()
            .dir("/srv")
            .env("A", "1")
            .env("B", "2")
            .stdout(PathBuf::from("/tmp/out.log"))
            .shell(Shell::Bash);
        let overrides = LaunchOptions::new().env("B", "3").stdout(Sink::Null);

        let merged = configured.merge(&overrides);
        assert_eq!(merged.dir, Some(PathBuf::from("/srv")));
        assert_eq!(merged.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(merged.env.get("B").map(String::as_str), Some("3"));
        assert_eq!(merged.stdout, Some(Sink::Null));
        assert_eq!(merged.stderr, None);
        assert_eq!(merged.shell, Some(Shell::Bash));
    }

    #[test]
    fn test_captures_piped_output() {
        let launch = LaunchOptions::new().env("GREETING", "hello");
        let mut handle =
            ProcessHandle::spawn(Shell::Sh.command("echo $GREETING; echo oops >&2"), &launch)
                .unwrap();
        for _ in 0..100 {
            let output = handle.output().clone();
            if handle.is_dead()
                && output.stdout_lossy().contains("hello")
                && output.stderr_lossy().contains("oops")
            {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        assert!(handle.is_dead());
        assert_eq!(handle.output().stdout_lossy(), "hello\n");
        assert_eq!(handle.output().stderr_lossy(), "oops\n");
    }

    #[test]
    fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("logs").join("out.log");
        fs::create_dir_all(log.parent().unwrap()).unwrap();
        fs::write(&log, "first\n").unwrap();

        let launch = LaunchOptions::new().stdout(log.clone());
        let mut handle = ProcessHandle::spawn(Shell::Sh.command("echo second"), &launch).unwrap();
        for _ in 0..100 {
            if handle.is_dead() {
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        handle.shutdown(Duration::from_secs(3));

        assert_eq!(fs::read_to_string(&log).unwrap(), "first\nsecond\n");
    }

    #[test]
    fn test_terminate_escalates_to_kill() {
        let mut handle = ProcessHandle::spawn(
            Shell::Sh.command("trap '' TERM; while true; do sleep 0.1; done"),
            &LaunchOptions::new(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!handle.is_dead());

        let started = Instant::now();
        handle.terminate(Duration::from_millis(300));
        assert!(handle.is_dead());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
