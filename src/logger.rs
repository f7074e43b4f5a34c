use crate::env;
use console::style;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::Write;

struct Logger {
    level: LevelFilter,
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level = match record.level() {
            Level::Error => style("ERROR").red().bold(),
            Level::Warn => style("WARN").yellow().bold(),
            Level::Info => style("INFO").cyan(),
            Level::Debug => style("DEBUG").magenta(),
            Level::Trace => style("TRACE").dim(),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = if self.level >= LevelFilter::Debug {
            writeln!(
                stderr,
                "{} {level} {}",
                style(record.target()).dim(),
                record.args()
            )
        } else {
            writeln!(stderr, "{level} {}", record.args())
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the stderr logger, filtered by `DAEMON_HARNESS_LOG`.
///
/// Calling this more than once is harmless; only the first call wins.
pub fn init() {
    let level = *env::DAEMON_HARNESS_LOG;
    if log::set_boxed_logger(Box::new(Logger { level })).is_ok() {
        log::set_max_level(level);
    }
}
