//! Lifecycle hooks for daemons.
//!
//! A [`DaemonPlugin`] observes (or adjusts) a runner at its lifecycle seams
//! without wrapping it. Every hook has a no-op default, so a plugin only
//! implements the ones it cares about.

use crate::runner::DaemonRunner;

pub trait DaemonPlugin: Send {
    /// Runs once, right after the runner is built.
    fn init(&mut self, _daemon: &mut DaemonRunner) {}

    fn before_start(&mut self, _daemon: &mut DaemonRunner) {}

    fn after_start(&mut self, _daemon: &mut DaemonRunner) {}

    fn before_stop(&mut self, _daemon: &mut DaemonRunner) {}

    fn after_stop(&mut self, _daemon: &mut DaemonRunner) {}
}

/// The lifecycle seam a hook fires at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HookType {
    Init,
    BeforeStart,
    AfterStart,
    BeforeStop,
    AfterStop,
}

impl HookType {
    pub(crate) fn fire(self, plugin: &mut dyn DaemonPlugin, daemon: &mut DaemonRunner) {
        match self {
            HookType::Init => plugin.init(daemon),
            HookType::BeforeStart => plugin.before_start(daemon),
            HookType::AfterStart => plugin.after_start(daemon),
            HookType::BeforeStop => plugin.before_stop(daemon),
            HookType::AfterStop => plugin.after_stop(daemon),
        }
    }
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookType::Init => write!(f, "init"),
            HookType::BeforeStart => write!(f, "before_start"),
            HookType::AfterStart => write!(f, "after_start"),
            HookType::BeforeStop => write!(f, "before_stop"),
            HookType::AfterStop => write!(f, "after_stop"),
        }
    }
}
