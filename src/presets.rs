//! Well-known daemons whose binaries are found on PATH.

use crate::Result;
use crate::error::{DaemonError, FileError};
use crate::runner::{DaemonRunner, DaemonRunnerBuilder};
use itertools::Itertools;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    /// Executable names tried on PATH, in order.
    pub candidates: &'static [&'static str],
    /// Used when no candidate is on PATH.
    pub fallback: Option<&'static str>,
    pub cmd_prefix: Option<&'static str>,
}

pub const NGINX: Preset = Preset {
    name: "nginx",
    candidates: &["nginx"],
    fallback: Some("/usr/sbin/nginx"),
    cmd_prefix: None,
};

pub const TARANTOOL: Preset = Preset {
    name: "tarantool",
    candidates: &["tarantool_box", "tarantool"],
    fallback: None,
    cmd_prefix: None,
};

pub const ALL: &[Preset] = &[NGINX, TARANTOOL];

impl Preset {
    pub fn by_name(name: &str) -> Option<Preset> {
        ALL.iter().find(|p| p.name == name).copied()
    }

    pub fn known_names() -> String {
        ALL.iter().map(|p| p.name).join(", ")
    }

    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self
            .candidates
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
        {
            return Ok(path);
        }
        match self.fallback {
            Some(fallback) => {
                debug!(
                    "{} not found on PATH, falling back to {fallback}",
                    self.name
                );
                Ok(PathBuf::from(fallback))
            }
            None => Err(DaemonError::BinaryNotFound {
                path: PathBuf::from(self.candidates.first().copied().unwrap_or(self.name)),
            }
            .into()),
        }
    }

    /// A runner builder named after the preset. Building it still checks
    /// that the resolved binary exists and is executable.
    pub fn builder(&self) -> Result<DaemonRunnerBuilder> {
        let mut builder = DaemonRunner::builder(self.name, self.resolve()?);
        if let Some(prefix) = self.cmd_prefix {
            builder = builder.cmd_prefix(prefix);
        }
        Ok(builder)
    }
}

/// Delete tarantool snapshot (`*.snap`) and write-ahead log (`*.xlog`)
/// files in `dir`. Returns how many were removed.
pub fn remove_tarantool_snapshots(dir: &Path) -> Result<usize> {
    debug!("removing tarantool snapshots in {}", dir.display());
    let entries = fs::read_dir(dir).map_err(|source| FileError::ReadError {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_storage = path
            .extension()
            .is_some_and(|ext| ext == "snap" || ext == "xlog");
        if !is_storage || !path.is_file() {
            continue;
        }
        fs::remove_file(&path).map_err(|source| FileError::RemoveError {
            path: path.clone(),
            source,
        })?;
        trace!("removed {}", path.display());
        removed += 1;
    }
    Ok(removed)
}

/// Run the daemon's command line once with `--init-storage` appended and
/// wait for it. Uses the daemon's working directory, environment and shell.
pub fn init_tarantool_storage(daemon: &DaemonRunner) -> Result<()> {
    let cmd = format!("{} --init-storage", daemon.cmd());
    debug!("initializing storage of daemon {}: {cmd}", daemon.name());
    let launch = daemon.launch_options();
    let mut command = launch.shell.unwrap_or_default().command(&cmd);
    if let Some(dir) = &launch.dir {
        command.current_dir(dir);
    }
    command.envs(&launch.env);
    let status = command.status().map_err(|source| DaemonError::LaunchFailed {
        name: daemon.name().to_string(),
        cmd: cmd.clone(),
        source,
    })?;
    if !status.success() {
        return Err(DaemonError::InitStorageFailed {
            name: daemon.name().to_string(),
            status,
        }
        .into());
    }
    Ok(())
}
