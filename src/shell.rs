//! Shell used to interpret prefixed and literal daemon command lines.

use serde::{Deserialize, Serialize};
use std::process::Command;

/// Supported shells for command execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    /// POSIX-compatible shell
    #[default]
    Sh,
    Bash,
    Zsh,
    Fish,
}

impl Shell {
    pub fn program(&self) -> &'static str {
        match self {
            Shell::Sh => "sh",
            Shell::Bash => "bash",
            Shell::Zsh => "zsh",
            Shell::Fish => "fish",
        }
    }

    /// Returns the arguments needed to execute a command string
    pub fn exec_args(&self, command: &str) -> Vec<String> {
        vec!["-c".to_string(), command.to_string()]
    }

    /// Creates a std Command configured to run the given command string
    pub fn command(&self, cmd: &str) -> Command {
        let mut command = Command::new(self.program());
        command.args(self.exec_args(cmd));
        command
    }
}

impl std::fmt::Display for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program())
    }
}

impl std::str::FromStr for Shell {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sh" => Ok(Shell::Sh),
            "bash" => Ok(Shell::Bash),
            "zsh" => Ok(Shell::Zsh),
            "fish" => Ok(Shell::Fish),
            _ => Err(format!("unknown shell: {s}")),
        }
    }
}
