use super::{Target, targets};
use daemon_harness::Result;
use daemon_harness::management::DaemonManagement;
use daemon_harness::procs::PROCS;
use daemon_harness::runner::DaemonRunner;
use daemon_harness::service::DaemonService;

/// Starts daemons and services from daemons.toml
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "s",
    verbatim_doc_comment,
    long_about = "\
Starts daemons and services from daemons.toml

Without names every daemon is started, then every service. A daemon whose
PID file points at a running process is left alone, and so is a service
with any such daemon.

Examples:
  daemon-harness start              Start everything
  daemon-harness start api web      Start the api daemon and the web service"
)]
pub struct Start {
    /// Daemon or service names
    names: Vec<String>,
}

impl Start {
    pub fn run(&self, management: &mut DaemonManagement) -> Result<()> {
        if self.names.is_empty() {
            for name in management.daemons().keys().cloned().collect::<Vec<_>>() {
                management.checkout_daemon(&name, start_daemon)?;
            }
            let services: Vec<String> =
                management.services().map(|(n, _)| n.to_string()).collect();
            for name in services {
                management.checkout_service(&name, start_service)?;
            }
            return Ok(());
        }
        for target in targets(management, &self.names)? {
            match target {
                Target::Daemon(name) => management.checkout_daemon(&name, start_daemon)?,
                Target::Service(name) => management.checkout_service(&name, start_service)?,
            }
        }
        Ok(())
    }
}

/// Pid of a process started by an earlier invocation, if it is still up.
fn running_pid(daemon: &DaemonRunner) -> Option<u32> {
    daemon.pid_file().pid().filter(|pid| PROCS.is_running(*pid))
}

fn start_daemon(daemon: &mut DaemonRunner) -> Result<()> {
    if let Some(pid) = running_pid(daemon) {
        info!("daemon {} is already running with pid {pid}", daemon.name());
        return Ok(());
    }
    daemon.start()
}

/// Starting a service over a running daemon would replace its PID file and
/// orphan the old process, so such services are skipped.
fn start_service(service: &mut dyn DaemonService) -> Result<()> {
    let (running, total) = {
        let daemons = service.daemons();
        let running = daemons.iter().filter(|d| running_pid(d).is_some()).count();
        (running, daemons.len())
    };
    if running == 0 {
        return service.start();
    }
    if running == total {
        info!("service {} is already running", service.name());
    } else {
        warn!(
            "service {} is partially running ({running} of {total} daemons), stop it before starting it again",
            service.name()
        );
    }
    Ok(())
}
