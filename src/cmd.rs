//! Command line composition.
//!
//! A daemon's invocation is either composed from a prefix, the binary path
//! and an ordered set of options, or given literally. [`CommandLine`] holds
//! that choice and [`compile_cmd`] renders the composed form.

use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt::Display;

/// Ordered command line options.
///
/// Valued options render as `flag=value`, bare flags as `flag`. Adding a flag
/// that is already present replaces its value and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdArgs {
    options: IndexMap<String, Option<String>>,
}

impl CmdArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_option<V: Into<String>>(&mut self, flag: impl Into<String>, value: Option<V>) {
        self.options.insert(flag.into(), value.map(Into::into));
    }

    pub fn add_flag(&mut self, flag: impl Into<String>) {
        self.options.insert(flag.into(), None);
    }

    /// `None` if the flag is absent, `Some(None)` for a bare flag.
    pub fn get_option(&self, flag: &str) -> Option<Option<&str>> {
        self.options.get(flag).map(|v| v.as_deref())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.options.contains_key(flag)
    }

    pub fn remove_option(&mut self, flag: &str) -> Option<Option<String>> {
        self.options.shift_remove(flag)
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.options.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// One argv entry per option, for launching without a shell.
    pub fn to_args(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|(flag, value)| match value {
                Some(value) => format!("{flag}={value}"),
                None => flag.clone(),
            })
            .collect()
    }
}

impl Display for CmdArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_args().join(" ").trim())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Option<V>)> for CmdArgs {
    fn from_iter<T: IntoIterator<Item = (K, Option<V>)>>(iter: T) -> Self {
        let mut args = Self::new();
        for (flag, value) in iter {
            args.add_option(flag, value);
        }
        args
    }
}

/// How a daemon's command line is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// `prefix binary options...`
    Composed(CmdArgs),
    /// Used verbatim; prefix, binary and options are ignored.
    Literal(String),
}

impl CommandLine {
    /// A literal command from separate words, joined by single spaces.
    pub fn literal_from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Literal(args.into_iter().map(|a| a.as_ref().to_string()).join(" "))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }

    pub fn render(&self, prefix: Option<&str>, binary: &str) -> String {
        match self {
            Self::Composed(args) => compile_cmd(prefix, binary, args),
            Self::Literal(cmd) => cmd.trim().to_string(),
        }
    }
}

impl Default for CommandLine {
    fn default() -> Self {
        Self::Composed(CmdArgs::default())
    }
}

/// Join the prefix, binary and options, dropping empty parts.
pub fn compile_cmd(prefix: Option<&str>, binary: &str, args: &CmdArgs) -> String {
    let args = args.to_string();
    [prefix.unwrap_or_default(), binary, args.as_str()]
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .join(" ")
}
