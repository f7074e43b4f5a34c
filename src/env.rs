use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;
use std::time::Duration;

pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub static DAEMON_HARNESS_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("DAEMON_HARNESS_LOG").unwrap_or(log::LevelFilter::Info));

// How long a terminated process gets before it is sent SIGKILL
pub static DAEMON_HARNESS_KILL_TIMEOUT: Lazy<Duration> = Lazy::new(|| {
    var_duration("DAEMON_HARNESS_KILL_TIMEOUT").unwrap_or(Duration::from_secs(3))
});

pub static DAEMON_HARNESS_CONFIG: Lazy<PathBuf> =
    Lazy::new(|| var_path("DAEMON_HARNESS_CONFIG").unwrap_or(CWD.join("daemons.toml")));

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_duration(name: &str) -> Option<Duration> {
    var(name)
        .ok()
        .and_then(|val| humantime::parse_duration(&val).ok())
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
