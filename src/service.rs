//! Services: start/stop logic spanning one or more daemons.
//!
//! A service is anything with a name that can be started and stopped,
//! typically a few [`DaemonRunner`]s plus whatever setup they need (a client
//! to configure, fixtures to load). [`RunnerGroup`] covers the common case of
//! a plain ordered set of runners.

use crate::Result;
use crate::error::RegistryError;
use crate::runner::DaemonRunner;
use indexmap::IndexMap;

pub trait DaemonService {
    fn name(&self) -> &str;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Runners owned by this service, for status reporting.
    fn daemons(&self) -> Vec<&DaemonRunner> {
        Vec::new()
    }
}

/// `restart` for every service, always `stop` followed by `start`.
pub trait RestartService: DaemonService {
    fn restart(&mut self) -> Result<()>;
}

impl<S: DaemonService + ?Sized> RestartService for S {
    fn restart(&mut self) -> Result<()> {
        self.stop()?;
        self.start()
    }
}

/// A named set of runners started in insertion order and stopped in reverse.
#[derive(Debug)]
pub struct RunnerGroup {
    name: String,
    runners: IndexMap<String, DaemonRunner>,
}

impl RunnerGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runners: IndexMap::new(),
        }
    }

    pub fn add(&mut self, runner: DaemonRunner) -> Result<()> {
        if self.runners.contains_key(runner.name()) {
            return Err(RegistryError::DuplicateDaemon {
                name: runner.name().to_string(),
            }
            .into());
        }
        self.runners.insert(runner.name().to_string(), runner);
        Ok(())
    }

    pub fn with(mut self, runner: DaemonRunner) -> Result<Self> {
        self.add(runner)?;
        Ok(self)
    }

    pub fn runner(&self, name: &str) -> Option<&DaemonRunner> {
        self.runners.get(name)
    }

    pub fn runner_mut(&mut self, name: &str) -> Option<&mut DaemonRunner> {
        self.runners.get_mut(name)
    }
}

impl DaemonService for RunnerGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) -> Result<()> {
        for runner in self.runners.values_mut() {
            runner.start()?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        for runner in self.runners.values_mut().rev() {
            runner.stop();
        }
        Ok(())
    }

    fn daemons(&self) -> Vec<&DaemonRunner> {
        self.runners.values().collect()
    }
}
