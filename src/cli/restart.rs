use super::{Target, targets};
use daemon_harness::Result;
use daemon_harness::management::DaemonManagement;
use daemon_harness::service::RestartService;

/// Stops and then starts daemons and services
#[derive(Debug, clap::Args)]
#[clap(verbatim_doc_comment)]
pub struct Restart {
    /// Daemon or service names
    names: Vec<String>,
}

impl Restart {
    pub fn run(&self, management: &mut DaemonManagement) -> Result<()> {
        if self.names.is_empty() {
            return management.restart_all();
        }
        for target in targets(management, &self.names)? {
            match target {
                Target::Daemon(name) => management.checkout_daemon(&name, |d| d.restart())?,
                Target::Service(name) => management.checkout_service(&name, |s| s.restart())?,
            }
        }
        Ok(())
    }
}
