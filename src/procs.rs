//! Process table access: descendant enumeration, liveness and signals.

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{ProcessStatus, ProcessesToUpdate};

pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for a process to disappear after SIGKILL.
pub(crate) const KILL_GRACE: Duration = Duration::from_secs(1);

pub struct Procs {
    system: Mutex<sysinfo::System>,
}

pub static PROCS: Lazy<Procs> = Lazy::new(Procs::new);

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        let procs = Self {
            system: Mutex::new(sysinfo::System::new()),
        };
        procs.refresh_processes();
        procs
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether `pid` exists and is neither a zombie nor dead.
    pub fn is_running(&self, pid: u32) -> bool {
        self.refresh_pids(&[pid]);
        self.lock_system()
            .process(sysinfo::Pid::from_u32(pid))
            .is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    }

    /// When `pid` started, in seconds since the Unix epoch.
    pub fn start_time(&self, pid: u32) -> Option<u64> {
        self.refresh_pids(&[pid]);
        self.lock_system()
            .process(sysinfo::Pid::from_u32(pid))
            .map(|p| p.start_time())
    }

    /// Every descendant of `pid`, deepest first, from a fresh snapshot.
    ///
    /// Threads are skipped so that only real processes get signaled.
    pub fn all_children(&self, pid: u32) -> Vec<u32> {
        self.refresh_processes();
        let system = self.lock_system();
        let root = sysinfo::Pid::from_u32(pid);
        let mut depths: HashMap<u32, usize> = HashMap::new();
        for (child_pid, process) in system.processes() {
            if process.thread_kind().is_some() || *child_pid == root {
                continue;
            }
            let mut process = process;
            let mut depth = 1;
            while let Some(parent) = process.parent() {
                if parent == root {
                    depths.insert(child_pid.as_u32(), depth);
                    break;
                }
                match system.process(parent) {
                    Some(p) => process = p,
                    None => break,
                }
                depth += 1;
            }
        }
        let mut children: Vec<(u32, usize)> = depths.into_iter().collect();
        children.sort_by(|(a_pid, a_depth), (b_pid, b_depth)| {
            b_depth.cmp(a_depth).then(a_pid.cmp(b_pid))
        });
        children.into_iter().map(|(pid, _)| pid).collect()
    }

    /// SIGTERM, wait up to `timeout`, then SIGKILL.
    ///
    /// For processes that are not our own children; those are reaped through
    /// their `Child` handle instead. Never fails: a process that is already
    /// gone counts as terminated.
    pub fn terminate(&self, pid: u32, timeout: Duration) {
        if !send_signal(pid, Signal::SIGTERM) {
            return;
        }
        if self.wait_exit(pid, timeout) {
            return;
        }
        warn!("process {pid} did not exit within {timeout:?} after SIGTERM, sending SIGKILL");
        if !send_signal(pid, Signal::SIGKILL) {
            return;
        }
        if !self.wait_exit(pid, KILL_GRACE) {
            error!("process {pid} is still running after SIGKILL");
        }
    }

    /// Poll until `pid` is gone or `timeout` elapses. True if it exited.
    pub fn wait_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    pub(crate) fn refresh_processes(&self) {
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::All, true);
    }

    pub(crate) fn refresh_pids(&self, pids: &[u32]) {
        let pids: Vec<sysinfo::Pid> = pids.iter().map(|p| sysinfo::Pid::from_u32(*p)).collect();
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::Some(&pids), true);
    }
}

/// Send `signal` to `pid`. False if the process does not exist (or must not
/// be signaled), true if the signal was delivered.
pub fn send_signal(pid: u32, signal: Signal) -> bool {
    // 0 and negative pids address process groups, and our own pid is never a daemon
    if pid == 0 || pid > i32::MAX as u32 || pid == std::process::id() {
        warn!("refusing to send {} to pid {pid}", signal.as_str());
        return false;
    }
    match kill(nix::unistd::Pid::from_raw(pid as i32), signal) {
        Ok(()) => {
            debug!("sent {} to pid {pid}", signal.as_str());
            true
        }
        Err(Errno::ESRCH) => {
            debug!("pid {pid} already exited");
            false
        }
        Err(e) => {
            warn!("failed to send {} to pid {pid}: {e}", signal.as_str());
            false
        }
    }
}
