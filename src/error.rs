//! Diagnostic error types for daemon-harness.
//!
//! Every error derives both `thiserror::Error` and `miette::Diagnostic`, so
//! callers get codes and help text when rendering, and can branch on the
//! concrete kind with `Report::downcast_ref`.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or launching a daemon.
#[derive(Debug, Error, Diagnostic)]
pub enum DaemonError {
    #[error("daemon binary not found: {}", path.display())]
    #[diagnostic(
        code(daemon_harness::daemon::binary_not_found),
        help("check the path, or install the binary and make sure it is on PATH")
    )]
    BinaryNotFound { path: PathBuf },

    #[error("daemon binary is not executable: {}", path.display())]
    #[diagnostic(
        code(daemon_harness::daemon::binary_not_executable),
        help("make the file executable, e.g. chmod +x <path>")
    )]
    BinaryNotExecutable { path: PathBuf },

    #[error("daemon name cannot be empty")]
    #[diagnostic(
        code(daemon_harness::daemon::missing_name),
        help("every daemon needs a name so it can be looked up in the registry")
    )]
    MissingName,

    #[error("failed to launch daemon '{name}': {cmd}")]
    #[diagnostic(code(daemon_harness::daemon::launch_failed))]
    LaunchFailed {
        name: String,
        cmd: String,
        #[source]
        source: io::Error,
    },

    #[error("storage initialization for daemon '{name}' failed: {status}")]
    #[diagnostic(
        code(daemon_harness::daemon::init_storage_failed),
        help("run the command by hand to see what it reports")
    )]
    InitStorageFailed {
        name: String,
        status: std::process::ExitStatus,
    },
}

/// Errors raised by the daemon/service registry.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("daemon '{name}' not found")]
    #[diagnostic(code(daemon_harness::registry::daemon_not_found))]
    DaemonNotFound {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("service '{name}' not found")]
    #[diagnostic(code(daemon_harness::registry::service_not_found))]
    ServiceNotFound {
        name: String,
        #[help]
        suggestion: Option<String>,
    },

    #[error("daemon '{name}' is already registered")]
    #[diagnostic(
        code(daemon_harness::registry::duplicate_daemon),
        help("daemon names must be unique; stop and remove the existing entry first")
    )]
    DuplicateDaemon { name: String },

    #[error("service '{name}' is already registered")]
    #[diagnostic(
        code(daemon_harness::registry::duplicate_service),
        help("service names must be unique; stop and remove the existing entry first")
    )]
    DuplicateService { name: String },

    #[error("service name cannot be empty")]
    #[diagnostic(code(daemon_harness::registry::unnamed_service))]
    UnnamedService,
}

/// Error for TOML configuration parse failures with source code highlighting.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to parse configuration")]
#[diagnostic(code(daemon_harness::config::parse_error))]
pub struct ConfigParseError {
    #[source_code]
    pub src: NamedSource<String>,

    #[label("{message}")]
    pub span: SourceSpan,

    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ConfigParseError {
    pub fn from_toml_error(path: &std::path::Path, contents: String, err: toml::de::Error) -> Self {
        let message = err.message().to_string();
        let span = err
            .span()
            .map(|r| SourceSpan::from(r.start..r.end))
            .unwrap_or_else(|| SourceSpan::from(0..0));

        Self {
            src: NamedSource::new(path.display().to_string(), contents),
            span,
            message,
            help: Some("check TOML syntax at https://toml.io".to_string()),
        }
    }
}

/// Semantic errors in an otherwise well-formed configuration file.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("daemon '{daemon}' uses unknown preset '{preset}'")]
    #[diagnostic(code(daemon_harness::config::unknown_preset))]
    UnknownPreset {
        daemon: String,
        preset: String,
        #[help]
        known: String,
    },

    #[error("daemon '{daemon}' has neither 'bin' nor 'preset'")]
    #[diagnostic(
        code(daemon_harness::config::missing_binary),
        help("set bin = \"/path/to/executable\" or preset = \"nginx\"")
    )]
    MissingBinary { daemon: String },

    #[error("daemon '{daemon}' has an invalid kill_timeout '{value}'")]
    #[diagnostic(
        code(daemon_harness::config::invalid_timeout),
        help("use a humantime duration such as \"500ms\" or \"3s\"")
    )]
    InvalidTimeout {
        daemon: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
}

/// Errors related to reading the configuration file.
#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("failed to read file: {}", path.display())]
    #[diagnostic(code(daemon_harness::file::read_error))]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove file: {}", path.display())]
    #[diagnostic(code(daemon_harness::file::remove_error))]
    RemoveError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised by the port allocator.
#[derive(Debug, Error, Diagnostic)]
pub enum PortError {
    #[error("no free port found in {start}..={end} after {attempts} attempts")]
    #[diagnostic(
        code(daemon_harness::port::exhausted),
        help("widen the port range or release ports that are no longer used")
    )]
    Exhausted { start: u16, end: u16, attempts: u32 },
}

/// Find the most similar registered name for suggestions.
pub fn find_similar_name<'a>(
    name: &str,
    available: impl Iterator<Item = &'a str>,
) -> Option<String> {
    use fuzzy_matcher::FuzzyMatcher;
    use fuzzy_matcher::skim::SkimMatcherV2;

    let matcher = SkimMatcherV2::default();
    available
        .filter_map(|candidate| {
            matcher
                .fuzzy_match(candidate, name)
                .map(|score| (candidate, score))
        })
        .max_by_key(|(_, score)| *score)
        .filter(|(_, score)| *score > 0)
        .map(|(candidate, _)| format!("did you mean '{candidate}'?"))
}
