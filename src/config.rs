//! `daemons.toml`: daemons and services described in a file.
//!
//! ```toml
//! [daemons.api]
//! bin = "./bin/api"
//! pid_file = "/tmp/api.pid"
//! kill_timeout = "5s"
//!
//! [daemons.api.options]
//! "--port" = 8080
//! "--verbose" = true
//!
//! [services.web.daemons.nginx]
//! preset = "nginx"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use crate::cmd::{CmdArgs, CommandLine};
use crate::error::{ConfigError, ConfigParseError, FileError};
use crate::management::DaemonManagement;
use crate::presets::Preset;
use crate::process::{LaunchOptions, Sink};
use crate::runner::{DaemonRunner, DaemonRunnerBuilder};
use crate::service::RunnerGroup;
use crate::shell::Shell;
use crate::{Result, env};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub daemons: IndexMap<String, DaemonConfig>,
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    #[serde(skip)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub daemons: IndexMap<String, DaemonConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub bin: Option<PathBuf>,
    pub preset: Option<String>,
    pub prefix: Option<Words>,
    pub pid_file: Option<PathBuf>,
    pub stdout: Option<PathBuf>,
    pub stderr: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub shell: Option<Shell>,
    pub kill_timeout: Option<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    /// Run verbatim instead of composing prefix, binary and options.
    pub cmd: Option<Words>,
    #[serde(default)]
    pub options: IndexMap<String, OptionValue>,
}

/// A command fragment, either one string or a list of words that gets
/// shell-quoted and joined.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Words {
    Line(String),
    List(Vec<String>),
}

impl Words {
    pub fn to_line(&self) -> String {
        match self {
            Words::Line(line) => line.clone(),
            Words::List(words) => shell_words::join(words),
        }
    }
}

/// `true` renders a bare flag, `false` drops the option.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Switch(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl OptionValue {
    fn render(&self) -> Option<Option<String>> {
        match self {
            OptionValue::Switch(false) => None,
            OptionValue::Switch(true) => Some(None),
            OptionValue::Integer(n) => Some(Some(n.to_string())),
            OptionValue::Float(n) => Some(Some(n.to_string())),
            OptionValue::Text(s) => Some(Some(s.clone())),
        }
    }
}

impl HarnessConfig {
    /// Read `path`; a missing file is an empty configuration.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no config at {}, using an empty one", path.display());
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|e| FileError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_str(&raw, path)
    }

    pub fn parse_str(raw: &str, path: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)
            .map_err(|e| ConfigParseError::from_toml_error(path, raw.to_string(), e))?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory relative paths are resolved against.
    pub fn base_dir(&self) -> PathBuf {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| env::CWD.clone())
    }

    /// Build the registry. `defaults` sit under every daemon's configured
    /// launch options.
    pub fn management(&self, defaults: &LaunchOptions) -> Result<DaemonManagement> {
        let base = self.base_dir();
        let mut management = DaemonManagement::new();
        for (name, daemon) in &self.daemons {
            management.add_daemon(daemon.runner(name, &base, defaults)?)?;
        }
        for (name, service) in &self.services {
            let mut group = RunnerGroup::new(name);
            for (daemon_name, daemon) in &service.daemons {
                group.add(daemon.runner(daemon_name, &base, defaults)?)?;
            }
            management.add_service(group)?;
        }
        Ok(management)
    }
}

impl DaemonConfig {
    pub fn runner(&self, name: &str, base: &Path, defaults: &LaunchOptions) -> Result<DaemonRunner> {
        self.builder(name, base, defaults)?.build()
    }

    pub fn builder(
        &self,
        name: &str,
        base: &Path,
        defaults: &LaunchOptions,
    ) -> Result<DaemonRunnerBuilder> {
        let resolve = |path: &Path| base.join(path);

        let mut builder = match (&self.bin, &self.preset) {
            (Some(bin), _) => {
                let bin = if bin.components().count() > 1 {
                    resolve(bin)
                } else {
                    bin.clone()
                };
                DaemonRunner::builder(name, bin)
            }
            (None, Some(preset)) => {
                let preset = Preset::by_name(preset).ok_or_else(|| ConfigError::UnknownPreset {
                    daemon: name.to_string(),
                    preset: preset.clone(),
                    known: format!("known presets: {}", Preset::known_names()),
                })?;
                let mut builder = DaemonRunner::builder(name, preset.resolve()?);
                if let Some(prefix) = preset.cmd_prefix {
                    builder = builder.cmd_prefix(prefix);
                }
                builder
            }
            (None, None) => {
                return Err(ConfigError::MissingBinary {
                    daemon: name.to_string(),
                }
                .into());
            }
        };

        if let Some(prefix) = &self.prefix {
            builder = builder.cmd_prefix(prefix.to_line());
        }
        if let Some(pid_file) = &self.pid_file {
            builder = builder.pid_file(resolve(pid_file));
        }
        if let Some(timeout) = &self.kill_timeout {
            let timeout =
                humantime::parse_duration(timeout).map_err(|source| ConfigError::InvalidTimeout {
                    daemon: name.to_string(),
                    value: timeout.clone(),
                    source,
                })?;
            builder = builder.kill_timeout(timeout);
        }

        builder = match &self.cmd {
            Some(cmd) => builder.command(CommandLine::Literal(cmd.to_line())),
            None => builder.options(self.cmd_args()),
        };

        let mut launch = defaults.clone();
        launch.dir = self.dir.as_deref().map(resolve).or(launch.dir);
        if let Some(stdout) = &self.stdout {
            launch.stdout = Some(Sink::File(resolve(stdout)));
        }
        if let Some(stderr) = &self.stderr {
            launch.stderr = Some(Sink::File(resolve(stderr)));
        }
        launch.shell = self.shell.or(launch.shell);
        launch
            .env
            .extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(builder.launch(launch))
    }

    pub fn cmd_args(&self) -> CmdArgs {
        self.options
            .iter()
            .filter_map(|(flag, value)| value.render().map(|v| (flag.as_str(), v)))
            .collect()
    }
}

impl DaemonManagement {
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        config.management(&LaunchOptions::default())
    }
}
