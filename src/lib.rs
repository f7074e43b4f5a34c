//! Start, stop and restart external daemons from test suites.
//!
//! A [`DaemonRunner`] launches one daemon and takes it (and everything it
//! spawned) down again. [`DaemonManagement`] keeps named runners and
//! [`DaemonService`]s together and drives them in bulk.

#[macro_use]
extern crate log;

pub mod cmd;
pub mod config;
pub mod env;
pub mod error;
pub mod logger;
pub mod management;
pub mod pid_file;
pub mod plugin;
pub mod port;
pub mod presets;
pub mod process;
pub mod procs;
pub mod runner;
pub mod service;
pub mod shell;

pub use cmd::{CmdArgs, CommandLine, compile_cmd};
pub use config::HarnessConfig;
pub use management::{DaemonManagement, Intercept};
pub use miette::Result;
pub use pid_file::PidFile;
pub use plugin::DaemonPlugin;
pub use port::PortAllocator;
pub use process::{CapturedOutput, LaunchOptions, ProcessHandle, Sink};
pub use runner::{DaemonRunner, DaemonRunnerBuilder};
pub use service::{DaemonService, RestartService, RunnerGroup};
pub use shell::Shell;
