//! The registry of named daemons and services.
//!
//! [`DaemonManagement`] keeps daemons and services in insertion order, so
//! bulk operations always walk them the same way. Daemons are treated as the
//! foundation services build on: `start_all` starts daemons first and
//! `stop_all` stops daemons first as well.

use crate::Result;
use crate::error::{RegistryError, find_similar_name};
use crate::runner::DaemonRunner;
use crate::service::DaemonService;
use indexmap::IndexMap;
use miette::{Diagnostic, Report};

/// Errors a scoped checkout hands to a handler instead of returning.
///
/// Kinds are matched on the concrete error type inside the [`Report`], or on
/// an arbitrary predicate. Anything that matches no kind still propagates.
pub struct Intercept<'a, T: ?Sized> {
    kinds: Vec<Box<dyn Fn(&Report) -> bool + 'a>>,
    handler: Box<dyn FnMut(&mut T, &Report) + 'a>,
}

impl<'a, T: ?Sized> Intercept<'a, T> {
    pub fn new(handler: impl FnMut(&mut T, &Report) + 'a) -> Self {
        Self {
            kinds: Vec::new(),
            handler: Box::new(handler),
        }
    }

    /// Intercept every error of type `E`.
    pub fn kind<E: Diagnostic + Send + Sync + 'static>(mut self) -> Self {
        self.kinds
            .push(Box::new(|report: &Report| report.downcast_ref::<E>().is_some()));
        self
    }

    /// Intercept errors for which `predicate` holds.
    pub fn matching(mut self, predicate: impl Fn(&Report) -> bool + 'a) -> Self {
        self.kinds.push(Box::new(predicate));
        self
    }

    fn matches(&self, report: &Report) -> bool {
        self.kinds.iter().any(|kind| kind(report))
    }

    /// `Ok(Some(value))` on success, `Ok(None)` once the handler took the error.
    fn run<R>(mut self, entry: &mut T, f: impl FnOnce(&mut T) -> Result<R>) -> Result<Option<R>> {
        match f(&mut *entry) {
            Ok(value) => Ok(Some(value)),
            Err(report) if self.matches(&report) => {
                debug!("intercepted error in checkout: {report}");
                (self.handler)(entry, &report);
                Ok(None)
            }
            Err(report) => Err(report),
        }
    }
}

/// Whether a status row describes a daemon or a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Daemon,
    Service,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Daemon => write!(f, "daemon"),
            EntryKind::Service => write!(f, "service"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    pub name: String,
    pub kind: EntryKind,
    /// Daemon name, for rows that belong to a service.
    pub daemon: Option<String>,
    pub started: bool,
    pub pid: Option<u32>,
}

#[derive(Default)]
pub struct DaemonManagement {
    daemons: IndexMap<String, DaemonRunner>,
    services: IndexMap<String, Box<dyn DaemonService>>,
}

impl DaemonManagement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_daemon(&mut self, daemon: DaemonRunner) -> Result<()> {
        if self.daemons.contains_key(daemon.name()) {
            return Err(RegistryError::DuplicateDaemon {
                name: daemon.name().to_string(),
            }
            .into());
        }
        debug!("registering daemon {}", daemon.name());
        self.daemons.insert(daemon.name().to_string(), daemon);
        Ok(())
    }

    pub fn add_service(&mut self, service: impl DaemonService + 'static) -> Result<()> {
        self.add_boxed_service(Box::new(service))
    }

    pub fn add_boxed_service(&mut self, service: Box<dyn DaemonService>) -> Result<()> {
        let name = service.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistryError::UnnamedService.into());
        }
        if self.services.contains_key(&name) {
            return Err(RegistryError::DuplicateService { name }.into());
        }
        debug!("registering service {name}");
        self.services.insert(name, service);
        Ok(())
    }

    pub fn daemons(&self) -> &IndexMap<String, DaemonRunner> {
        &self.daemons
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &dyn DaemonService)> {
        self.services.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    pub fn daemon(&self, name: &str) -> Result<&DaemonRunner> {
        self.daemons
            .get(name)
            .ok_or_else(|| self.daemon_not_found(name))
    }

    pub fn daemon_mut(&mut self, name: &str) -> Result<&mut DaemonRunner> {
        if !self.daemons.contains_key(name) {
            return Err(self.daemon_not_found(name));
        }
        Ok(&mut self.daemons[name])
    }

    pub fn service(&self, name: &str) -> Result<&dyn DaemonService> {
        self.services
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| self.service_not_found(name))
    }

    pub fn service_mut(&mut self, name: &str) -> Result<&mut (dyn DaemonService + 'static)> {
        if !self.services.contains_key(name) {
            return Err(self.service_not_found(name));
        }
        Ok(self.services[name].as_mut())
    }

    fn daemon_not_found(&self, name: &str) -> Report {
        RegistryError::DaemonNotFound {
            name: name.to_string(),
            suggestion: find_similar_name(name, self.daemons.keys().map(String::as_str)),
        }
        .into()
    }

    fn service_not_found(&self, name: &str) -> Report {
        RegistryError::ServiceNotFound {
            name: name.to_string(),
            suggestion: find_similar_name(name, self.services.keys().map(String::as_str)),
        }
        .into()
    }

    /// Run `f` against one daemon. An unknown name fails before `f` runs.
    pub fn checkout_daemon<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut DaemonRunner) -> Result<R>,
    ) -> Result<R> {
        f(self.daemon_mut(name)?)
    }

    /// Like [`checkout_daemon`](Self::checkout_daemon), but errors matching
    /// `intercept` go to its handler and yield `Ok(None)`.
    pub fn checkout_daemon_intercepting<R>(
        &mut self,
        name: &str,
        intercept: Intercept<'_, DaemonRunner>,
        f: impl FnOnce(&mut DaemonRunner) -> Result<R>,
    ) -> Result<Option<R>> {
        let daemon = self.daemon_mut(name)?;
        intercept.run(daemon, f)
    }

    pub fn checkout_service<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut dyn DaemonService) -> Result<R>,
    ) -> Result<R> {
        f(self.service_mut(name)?)
    }

    pub fn checkout_service_intercepting<R>(
        &mut self,
        name: &str,
        intercept: Intercept<'_, dyn DaemonService>,
        f: impl FnOnce(&mut dyn DaemonService) -> Result<R>,
    ) -> Result<Option<R>> {
        let service = self.service_mut(name)?;
        intercept.run(service, |s| f(s))
    }

    pub fn start_daemons(&mut self) -> Result<()> {
        for daemon in self.daemons.values_mut() {
            daemon.start()?;
        }
        Ok(())
    }

    pub fn stop_daemons(&mut self) {
        for daemon in self.daemons.values_mut() {
            daemon.stop();
        }
    }

    pub fn restart_daemons(&mut self) -> Result<()> {
        self.stop_daemons();
        self.start_daemons()
    }

    pub fn start_services(&mut self) -> Result<()> {
        for service in self.services.values_mut() {
            service.start()?;
        }
        Ok(())
    }

    pub fn stop_services(&mut self) -> Result<()> {
        for service in self.services.values_mut() {
            service.stop()?;
        }
        Ok(())
    }

    pub fn restart_services(&mut self) -> Result<()> {
        self.stop_services()?;
        self.start_services()
    }

    pub fn start_all(&mut self) -> Result<()> {
        self.start_daemons()?;
        self.start_services()
    }

    pub fn stop_all(&mut self) -> Result<()> {
        self.stop_daemons();
        self.stop_services()
    }

    pub fn restart_all(&mut self) -> Result<()> {
        self.stop_all()?;
        self.start_all()
    }

    /// One row per registered daemon and per daemon owned by a service.
    pub fn status(&self) -> Vec<EntryStatus> {
        let daemons = self.daemons.values().map(|d| EntryStatus {
            name: d.name().to_string(),
            kind: EntryKind::Daemon,
            daemon: None,
            started: d.started(),
            pid: d.pid(),
        });
        let services = self.services.values().flat_map(|s| {
            s.daemons().into_iter().map(move |d| EntryStatus {
                name: s.name().to_string(),
                kind: EntryKind::Service,
                daemon: Some(d.name().to_string()),
                started: d.started(),
                pid: d.pid(),
            })
        });
        daemons.chain(services).collect()
    }
}

impl std::fmt::Debug for DaemonManagement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonManagement")
            .field("daemons", &self.daemons.keys().collect::<Vec<_>>())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish()
    }
}
