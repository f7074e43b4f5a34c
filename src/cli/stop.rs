use super::{Target, targets};
use daemon_harness::Result;
use daemon_harness::management::DaemonManagement;

/// Stops daemons and services along with their child processes
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "kill",
    verbatim_doc_comment,
    long_about = "\
Stops daemons and services along with their child processes

Daemons are found through their PID files, so anything started by an
earlier 'daemon-harness start' can be stopped. Each process gets SIGTERM,
then SIGKILL once DAEMON_HARNESS_KILL_TIMEOUT has passed.

Examples:
  daemon-harness stop               Stop everything
  daemon-harness stop api           Stop a single daemon"
)]
pub struct Stop {
    /// Daemon or service names
    names: Vec<String>,
}

impl Stop {
    pub fn run(&self, management: &mut DaemonManagement) -> Result<()> {
        if self.names.is_empty() {
            return management.stop_all();
        }
        for target in targets(management, &self.names)? {
            match target {
                Target::Daemon(name) => management.checkout_daemon(&name, |d| {
                    d.stop();
                    Ok(())
                })?,
                Target::Service(name) => management.checkout_service(&name, |s| s.stop())?,
            }
        }
        Ok(())
    }
}
