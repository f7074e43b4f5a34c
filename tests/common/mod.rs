#![allow(dead_code)]

use daemon_harness::procs::PROCS;
use daemon_harness::runner::{DaemonRunner, DaemonRunnerBuilder};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// A daemon that writes its pid to `--pid-file=PATH` and idles until
/// SIGTERM. With `--spawn-child` it first starts a long sleep in the
/// background and records that pid in `PATH.child`.
const FAKE_DAEMON: &str = r#"#!/bin/sh
pid_file=""
spawn_child=0
for arg in "$@"; do
    case "$arg" in
        --pid-file=*) pid_file="${arg#--pid-file=}" ;;
        --spawn-child) spawn_child=1 ;;
    esac
done
if [ "$spawn_child" = 1 ]; then
    sleep 300 &
    if [ -n "$pid_file" ]; then echo $! > "$pid_file.child"; fi
fi
if [ -n "$pid_file" ]; then echo $$ > "$pid_file"; fi
echo "fake daemon $$ ready"
trap 'exit 0' TERM
while true; do sleep 1; done
"#;

/// Path to the fake daemon, written once per test binary. Writing it per
/// test would race with concurrent forks holding the file open.
pub fn fake_daemon() -> &'static Path {
    static BIN: OnceLock<PathBuf> = OnceLock::new();
    BIN.get_or_init(|| {
        let dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(format!(
            "daemon-harness-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("fake-daemon");
        fs::write(&path, FAKE_DAEMON).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    })
}

/// Helper struct for daemon lifecycle tests
pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pid_path(&self, name: &str) -> PathBuf {
        self.dir().join(format!("{name}.pid"))
    }

    /// A fake daemon runner that records its pid in this environment.
    pub fn builder(&self, name: &str) -> DaemonRunnerBuilder {
        let pid_file = self.pid_path(name);
        DaemonRunner::builder(name, fake_daemon())
            .option("--pid-file", pid_file.display().to_string())
            .pid_file(pid_file)
            .kill_timeout(Duration::from_secs(3))
    }

    pub fn runner(&self, name: &str) -> DaemonRunner {
        self.builder(name).build().unwrap()
    }

    /// Pid written by the fake daemon, once it is there.
    pub fn wait_for_pid(&self, name: &str) -> u32 {
        read_pid(&self.pid_path(name))
    }

    /// Pid of the background child spawned with `--spawn-child`.
    pub fn wait_for_child_pid(&self, name: &str) -> u32 {
        read_pid(&self.dir().join(format!("{name}.pid.child")))
    }

    pub fn create_toml(&self, content: &str) -> PathBuf {
        let path = self.dir().join("daemons.toml");
        fs::write(&path, content).unwrap();
        path
    }

    /// Run the daemon-harness binary against this environment's config.
    pub fn run_command(&self, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_daemon-harness"))
            .arg("--config")
            .arg(self.dir().join("daemons.toml"))
            .args(args)
            .current_dir(self.dir())
            .env("DAEMON_HARNESS_LOG", "debug")
            .env("DAEMON_HARNESS_KILL_TIMEOUT", "3s")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .expect("Failed to execute daemon-harness")
    }
}

fn read_pid(path: &Path) -> u32 {
    let mut pid = None;
    let found = wait_until(Duration::from_secs(5), || {
        pid = fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok());
        pid.is_some()
    });
    assert!(found, "no pid written to {}", path.display());
    pid.unwrap()
}

/// Poll `f` every 50ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut f: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if f() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub fn is_running(pid: u32) -> bool {
    PROCS.is_running(pid)
}

/// Wait for `pid` to go away; zombies count as gone.
pub fn wait_for_exit(pid: u32) -> bool {
    wait_until(Duration::from_secs(10), || !is_running(pid))
}
