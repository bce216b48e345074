//! Centralized configuration for the tasks server
//!
//! `ServerConfig` is built once at startup (defaults, then environment, then
//! command-line overrides), validated, and shared read-only afterwards.

use gradle_tasks_core::{
    Error, Result, DEFAULT_REPLY_BUFFER, GRADLE_VAR, REPLY_BUFFER_VAR, SOCKET_VAR, TRANSPORT_VAR,
};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the server talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Newline-delimited JSON-RPC over a Unix domain socket
    #[default]
    Unix,
    /// Newline-delimited JSON-RPC over the process's stdin/stdout
    Stdio,
}

impl FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unix" => Ok(Transport::Unix),
            "stdio" => Ok(Transport::Stdio),
            other => Err(Error::configuration(format!(
                "Unsupported transport: {other}. Use 'unix' or 'stdio'"
            ))),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Unix => f.write_str("unix"),
            Transport::Stdio => f.write_str("stdio"),
        }
    }
}

/// Settings for invoking the Gradle command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildToolSettings {
    /// Explicit Gradle executable. When unset the project's wrapper is
    /// preferred and `gradle` on `PATH` is the fallback.
    pub executable: Option<PathBuf>,

    /// Arguments used to fetch a project
    pub project_args: Vec<String>,

    /// Arguments appended to every task run
    pub extra_args: Vec<String>,
}

impl Default for BuildToolSettings {
    fn default() -> Self {
        Self {
            executable: None,
            project_args: vec![
                "tasks".to_string(),
                "--all".to_string(),
                "--console=plain".to_string(),
            ],
            extra_args: vec!["--console=plain".to_string()],
        }
    }
}

/// Immutable server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub transport: Transport,

    /// Socket path for the unix transport
    pub socket_path: Option<PathBuf>,

    /// Replies buffered per operation before the build tool is slowed down
    pub reply_buffer: usize,

    pub build_tool: BuildToolSettings,

    /// Verbosity level for logging
    pub verbosity: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            socket_path: None,
            reply_buffer: DEFAULT_REPLY_BUFFER,
            build_tool: BuildToolSettings::default(),
            verbosity: 0,
        }
    }
}

impl ServerConfig {
    /// Defaults overlaid with the `GRADLE_TASKS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_lookup(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(transport) = lookup(TRANSPORT_VAR) {
            self.transport = transport.parse()?;
        }
        if let Some(socket) = lookup(SOCKET_VAR).filter(|s| !s.trim().is_empty()) {
            self.socket_path = Some(PathBuf::from(socket));
        }
        if let Some(gradle) = lookup(GRADLE_VAR).filter(|s| !s.trim().is_empty()) {
            self.build_tool.executable = Some(PathBuf::from(gradle));
        }
        if let Some(buffer) = lookup(REPLY_BUFFER_VAR) {
            self.reply_buffer = buffer.trim().parse().map_err(|e| {
                Error::configuration(format!("Invalid {REPLY_BUFFER_VAR} '{buffer}': {e}"))
            })?;
        }
        Ok(self)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.reply_buffer == 0 {
            return Err(Error::configuration(
                "Reply buffer must hold at least one reply",
            ));
        }
        if self.transport == Transport::Unix && self.socket_path.is_none() {
            return Err(Error::configuration(
                "The unix transport requires a socket path",
            ));
        }
        Ok(())
    }
}
