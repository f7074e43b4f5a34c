use crate::procs::PROCS;
use std::fmt::{Debug, Display};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A PID marker file written by the daemon itself.
///
/// The file outlives the `DaemonRunner` that launched the daemon, which makes
/// it the liveness signal of last resort: a runner built against the same
/// path in a later test run still sees the daemon as started.
///
/// None of the accessors fail. A missing path, a missing file and garbage
/// content all read as "no pid".
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PidFile {
    path: Option<PathBuf>,
}

impl PidFile {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.path.as_deref().is_some_and(Path::is_file)
    }

    /// The pid on the first line of the file, if it parses.
    pub fn pid(&self) -> Option<u32> {
        let path = self.path.as_deref()?;
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!("could not read pid file {}: {e}", path.display());
                }
                return None;
            }
        };
        raw.lines().next()?.trim().parse().ok()
    }

    /// Whether `pid` could have written this file: it must have started no
    /// later than the file was last modified. A pid recycled after the file
    /// was written fails this check.
    pub fn written_by(&self, pid: u32) -> bool {
        let Some(path) = self.path.as_deref() else {
            return false;
        };
        let Some(written) = fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        else {
            return false;
        };
        // start times have whole-second resolution
        PROCS
            .start_time(pid)
            .is_some_and(|started| started <= written.as_secs() + 1)
    }

    pub fn remove(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        match fs::remove_file(path) {
            Ok(()) => trace!("removed pid file {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!("could not remove pid file {}: {e}", path.display()),
        }
    }
}

impl Display for PidFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}", path.display()),
            None => write!(f, "<no pid file>"),
        }
    }
}

impl Debug for PidFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<PidFile {self}>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pid_file_with(contents: &str) -> (TempDir, PidFile) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        fs::write(&path, contents).unwrap();
        (dir, PidFile::new(Some(path)))
    }

    #[test]
    fn test_unset_path() {
        let pid_file = PidFile::new(None);
        assert!(!pid_file.exists());
        assert_eq!(pid_file.pid(), None);
        pid_file.remove();
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(Some(dir.path().join("gone.pid")));
        assert!(!pid_file.exists());
        assert_eq!(pid_file.pid(), None);
        pid_file.remove();
    }

    #[test]
    fn test_reads_first_line() {
        let (_dir, pid_file) = pid_file_with("4242  \nsomething else\n");
        assert!(pid_file.exists());
        assert_eq!(pid_file.pid(), Some(4242));
    }

    #[test]
    fn test_malformed_contents() {
        for contents in ["", "\n", "abc", "-5", "12 34", "99999999999999"] {
            let (_dir, pid_file) = pid_file_with(contents);
            assert!(pid_file.exists());
            assert_eq!(pid_file.pid(), None, "contents: {contents:?}");
        }
    }

    #[test]
    fn test_remove_twice() {
        let (_dir, pid_file) = pid_file_with("1");
        pid_file.remove();
        assert!(!pid_file.exists());
        pid_file.remove();
    }

    #[test]
    fn test_directory_is_not_a_pid_file() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::new(Some(dir.path().to_path_buf()));
        assert!(!pid_file.exists());
        assert_eq!(pid_file.pid(), None);
    }
}
