use clap::Parser;
use daemon_harness::config::HarnessConfig;
use daemon_harness::error::{RegistryError, find_similar_name};
use daemon_harness::management::DaemonManagement;
use daemon_harness::process::{LaunchOptions, Sink};
use daemon_harness::{Result, env};
use std::path::PathBuf;

mod restart;
mod start;
mod status;
mod stop;

#[derive(Debug, clap::Parser)]
#[clap(
    name = "daemon-harness",
    version,
    about = "Start, stop and restart the daemons in daemons.toml"
)]
struct Cli {
    /// Path to the configuration file
    #[clap(long, short, global = true, env = "DAEMON_HARNESS_CONFIG")]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Start(start::Start),
    Stop(stop::Stop),
    Restart(restart::Restart),
    Status(status::Status),
}

pub fn run() -> Result<()> {
    let args = Cli::parse();
    let path = args
        .config
        .unwrap_or_else(|| env::DAEMON_HARNESS_CONFIG.clone());
    let config = HarnessConfig::read(&path)?;
    // daemons outlive this process, so nothing may be left writing to our pipes
    let defaults = LaunchOptions::new().stdout(Sink::Null).stderr(Sink::Null);
    let mut management = config.management(&defaults)?;
    match args.command {
        Command::Start(start) => start.run(&mut management),
        Command::Stop(stop) => stop.run(&mut management),
        Command::Restart(restart) => restart.run(&mut management),
        Command::Status(status) => status.run(&management),
    }
}

/// A name given on the command line, resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Daemon(String),
    Service(String),
}

/// Resolve every name before anything is started or stopped, so a typo
/// fails the whole command. Daemon names win over service names.
fn targets(management: &DaemonManagement, names: &[String]) -> Result<Vec<Target>> {
    names
        .iter()
        .map(|name| {
            if management.daemons().contains_key(name) {
                Ok(Target::Daemon(name.clone()))
            } else if management.service(name).is_ok() {
                Ok(Target::Service(name.clone()))
            } else {
                let known = management
                    .daemons()
                    .keys()
                    .map(String::as_str)
                    .chain(management.services().map(|(name, _)| name));
                Err(RegistryError::DaemonNotFound {
                    name: name.clone(),
                    suggestion: find_similar_name(name, known),
                }
                .into())
            }
        })
        .collect()
}
