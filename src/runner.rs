//! The per-daemon lifecycle state machine.
//!
//! A [`DaemonRunner`] is *started* while it holds a process handle or while
//! its PID file exists, and *stopped* otherwise. The PID file half of that
//! rule lets a runner built in one test run see a daemon left behind by an
//! earlier one.

use crate::Result;
use crate::cmd::{CmdArgs, CommandLine};
use crate::env;
use crate::error::DaemonError;
use crate::pid_file::PidFile;
use crate::plugin::{DaemonPlugin, HookType};
use crate::process::{CapturedOutput, LaunchOptions, ProcessHandle, Sink};
use crate::procs::{PROCS, send_signal};
use crate::shell::Shell;
use nix::sys::signal::Signal;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

pub struct DaemonRunner {
    name: String,
    binary: PathBuf,
    cmd_prefix: Option<String>,
    command: CommandLine,
    pid_file: PidFile,
    process: Option<ProcessHandle>,
    plugin: Option<Box<dyn DaemonPlugin>>,
    launch: LaunchOptions,
    kill_timeout: Duration,
    last_output: Option<CapturedOutput>,
}

#[must_use]
pub struct DaemonRunnerBuilder {
    name: String,
    binary: PathBuf,
    cmd_prefix: Option<String>,
    command: CommandLine,
    pid_file: Option<PathBuf>,
    plugin: Option<Box<dyn DaemonPlugin>>,
    launch: LaunchOptions,
    kill_timeout: Option<Duration>,
}

impl DaemonRunnerBuilder {
    /// Prepended to the command line, which is then run through the shell.
    pub fn cmd_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.cmd_prefix = (!prefix.trim().is_empty()).then_some(prefix);
        self
    }

    pub fn pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    pub fn option(mut self, flag: impl Into<String>, value: impl Into<String>) -> Self {
        self.options_mut().add_option(flag, Some(value));
        self
    }

    pub fn flag(mut self, flag: impl Into<String>) -> Self {
        self.options_mut().add_flag(flag);
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: CmdArgs) -> Self {
        self.command = CommandLine::Composed(options);
        self
    }

    /// Run `cmd` verbatim instead of composing prefix, binary and options.
    pub fn literal_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.command = CommandLine::Literal(cmd.into());
        self
    }

    pub fn command(mut self, command: CommandLine) -> Self {
        self.command = command;
        self
    }

    pub fn plugin(mut self, plugin: impl DaemonPlugin + 'static) -> Self {
        self.plugin = Some(Box::new(plugin));
        self
    }

    pub fn stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.launch.stdout = Some(Sink::File(path.into()));
        self
    }

    pub fn stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.launch.stderr = Some(Sink::File(path.into()));
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.launch.dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.launch.env.insert(key.into(), value.into());
        self
    }

    pub fn shell(mut self, shell: Shell) -> Self {
        self.launch.shell = Some(shell);
        self
    }

    /// Configured launch options; later per-call overrides are merged on top.
    pub fn launch(mut self, launch: LaunchOptions) -> Self {
        self.launch = self.launch.merge(&launch);
        self
    }

    pub fn kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = Some(timeout);
        self
    }

    fn options_mut(&mut self) -> &mut CmdArgs {
        if let CommandLine::Literal(cmd) = &self.command {
            warn!(
                "daemon {} switches from literal command '{cmd}' to composed options",
                self.name
            );
            self.command = CommandLine::default();
        }
        match &mut self.command {
            CommandLine::Composed(args) => args,
            CommandLine::Literal(_) => unreachable!("literal command was just replaced"),
        }
    }

    /// Validate the binary and name, then run the plugin's `init` hook.
    pub fn build(self) -> Result<DaemonRunner> {
        if self.name.trim().is_empty() {
            return Err(DaemonError::MissingName.into());
        }
        let binary = resolve_binary(&self.binary)?;
        let mut runner = DaemonRunner {
            name: self.name,
            binary,
            cmd_prefix: self.cmd_prefix,
            command: self.command,
            pid_file: PidFile::new(self.pid_file),
            process: None,
            plugin: self.plugin,
            launch: self.launch,
            kill_timeout: self.kill_timeout.unwrap_or(*env::DAEMON_HARNESS_KILL_TIMEOUT),
            last_output: None,
        };
        runner.fire(HookType::Init);
        Ok(runner)
    }
}

/// Bare names are looked up on PATH; anything else must be an executable file.
fn resolve_binary(binary: &Path) -> Result<PathBuf> {
    if binary.components().count() == 1 && !binary.is_file() {
        return which::which(binary).map_err(|e| {
            debug!("{} not found on PATH: {e}", binary.display());
            DaemonError::BinaryNotFound {
                path: binary.to_path_buf(),
            }
            .into()
        });
    }
    let metadata = std::fs::metadata(binary).map_err(|_| DaemonError::BinaryNotFound {
        path: binary.to_path_buf(),
    })?;
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(DaemonError::BinaryNotExecutable {
            path: binary.to_path_buf(),
        }
        .into());
    }
    Ok(binary.to_path_buf())
}

impl DaemonRunner {
    pub fn builder(name: impl Into<String>, binary: impl Into<PathBuf>) -> DaemonRunnerBuilder {
        DaemonRunnerBuilder {
            name: name.into(),
            binary: binary.into(),
            cmd_prefix: None,
            command: CommandLine::default(),
            pid_file: None,
            plugin: None,
            launch: LaunchOptions::default(),
            kill_timeout: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn cmd_prefix(&self) -> Option<&str> {
        self.cmd_prefix.as_deref()
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    /// Options of a composed command line; `None` for a literal one.
    pub fn options(&self) -> Option<&CmdArgs> {
        match &self.command {
            CommandLine::Composed(args) => Some(args),
            CommandLine::Literal(_) => None,
        }
    }

    /// Add or replace an option, taking effect on the next start.
    pub fn add_option(&mut self, flag: impl Into<String>, value: Option<impl Into<String>>) {
        let flag: String = flag.into();
        match &mut self.command {
            CommandLine::Composed(args) => args.add_option(flag, value),
            CommandLine::Literal(cmd) => {
                warn!(
                    "ignoring option {flag} for daemon {}: it runs the literal command '{cmd}'",
                    self.name
                );
            }
        }
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    pub fn process(&self) -> Option<&ProcessHandle> {
        self.process.as_ref()
    }

    pub fn launch_options(&self) -> &LaunchOptions {
        &self.launch
    }

    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    pub fn set_plugin(&mut self, plugin: impl DaemonPlugin + 'static) {
        self.plugin = Some(Box::new(plugin));
    }

    /// The full command line, as it will be launched.
    pub fn cmd(&self) -> String {
        self.command
            .render(self.cmd_prefix.as_deref(), &self.binary.to_string_lossy())
    }

    /// Pid of the live process, else the pid recorded in the PID file.
    pub fn pid(&self) -> Option<u32> {
        self.process
            .as_ref()
            .map(ProcessHandle::pid)
            .or_else(|| self.pid_file.pid())
    }

    /// Captured pipe output of the live process, or of the last one stopped.
    pub fn output(&self) -> Option<&CapturedOutput> {
        self.process
            .as_ref()
            .map(ProcessHandle::output)
            .or(self.last_output.as_ref())
    }

    pub fn started(&self) -> bool {
        self.process.is_some() || self.pid_file.exists()
    }

    pub fn stopped(&self) -> bool {
        !self.started()
    }

    /// True without a process handle, or once the process exited.
    pub fn is_dead(&mut self) -> bool {
        match &mut self.process {
            Some(process) => process.is_dead(),
            None => true,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        self.start_with(&LaunchOptions::default())
    }

    /// Start with per-call launch options layered over the configured ones.
    pub fn start_with(&mut self, overrides: &LaunchOptions) -> Result<()> {
        if self.process.is_none() && self.pid_file.exists() {
            warn!(
                "daemon {} left a stale pid file behind, removing {}",
                self.name, self.pid_file
            );
            self.pid_file.remove();
        }
        if self.started() {
            debug!("daemon {} is already started", self.name);
            return Ok(());
        }

        self.fire(HookType::BeforeStart);

        let launch = self.launch.merge(overrides);
        let cmd = self.cmd();
        info!("starting daemon {}: {cmd}", self.name);
        let process = ProcessHandle::spawn(self.os_command(&cmd, &launch), &launch).map_err(
            |source| DaemonError::LaunchFailed {
                name: self.name.clone(),
                cmd: cmd.clone(),
                source,
            },
        )?;
        debug!("daemon {} has pid {}", self.name, process.pid());
        self.process = Some(process);

        self.fire(HookType::AfterStart);
        Ok(())
    }

    /// Prefixed and literal command lines go through the shell, a plain
    /// binary is executed directly.
    fn os_command(&self, cmd: &str, launch: &LaunchOptions) -> Command {
        match &self.command {
            CommandLine::Composed(args) if self.cmd_prefix.is_none() => {
                let mut command = Command::new(&self.binary);
                command.args(args.to_args());
                command
            }
            _ => launch.shell.unwrap_or_default().command(cmd),
        }
    }

    /// Stop the daemon along with every process it spawned.
    pub fn stop(&mut self) {
        self.stop_with(true)
    }

    /// Stop the daemon; with `recursive` its descendants are terminated
    /// first. Never fails: processes that are already gone count as stopped.
    pub fn stop_with(&mut self, recursive: bool) {
        if self.stopped() {
            debug!("daemon {} is already stopped", self.name);
            return;
        }
        info!("stopping daemon {}", self.name);

        self.fire(HookType::BeforeStop);

        let recorded_pid = self.pid_file.pid();
        // descendants must be captured before anything is signaled
        let mut known = Vec::new();
        if let Some(process) = &mut self.process {
            known.push(process.pid());
            if recursive {
                known.extend(process.capture_children().iter().copied());
            }
        }
        // only a pid that could have written the file is escalated or has its
        // children killed; a recycled pid just gets SIGTERM
        let owned_pid =
            recorded_pid.filter(|pid| known.contains(pid) || self.pid_file.written_by(*pid));
        let orphans: Vec<u32> = match owned_pid.filter(|pid| recursive && !known.contains(pid)) {
            Some(pid) => PROCS
                .all_children(pid)
                .into_iter()
                .filter(|child| !known.contains(child))
                .collect(),
            None => Vec::new(),
        };

        if let Some(pid) = recorded_pid {
            debug!("terminating daemon {} by pid file: {pid}", self.name);
            send_signal(pid, Signal::SIGTERM);
        }
        for pid in orphans {
            PROCS.terminate(pid, self.kill_timeout);
        }
        if let Some(mut process) = self.process.take() {
            let output = if recursive {
                process.shutdown(self.kill_timeout)
            } else {
                process.terminate(self.kill_timeout);
                process.output().clone()
            };
            self.last_output = Some(output);
        }
        match recorded_pid.filter(|pid| PROCS.is_running(*pid)) {
            Some(pid) if owned_pid == Some(pid) => PROCS.terminate(pid, self.kill_timeout),
            Some(pid) => warn!(
                "pid {pid} in {} started after the file was written, not escalating",
                self.pid_file
            ),
            None => {}
        }

        self.pid_file.remove();

        self.fire(HookType::AfterStop);
    }

    pub fn restart(&mut self) -> Result<()> {
        self.stop();
        self.start()
    }

    fn fire(&mut self, hook: HookType) {
        let Some(mut plugin) = self.plugin.take() else {
            return;
        };
        trace!("firing {hook} hook for daemon {}", self.name);
        hook.fire(plugin.as_mut(), self);
        // a hook may have installed a replacement plugin
        if self.plugin.is_none() {
            self.plugin = Some(plugin);
        }
    }
}

impl std::fmt::Debug for DaemonRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonRunner")
            .field("name", &self.name)
            .field("binary", &self.binary)
            .field("cmd_prefix", &self.cmd_prefix)
            .field("command", &self.command)
            .field("pid_file", &self.pid_file)
            .field("process", &self.process)
            .field("has_plugin", &self.plugin.is_some())
            .finish()
    }
}

impl std::fmt::Display for DaemonRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
