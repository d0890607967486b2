//! Configuration management for Deckshell.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/deckshell/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use multiplexer::{Dimensions, RouterConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_sessions must be between 1 and {MAX_SESSIONS_LIMIT}, got {0}")]
    InvalidMaxSessions(usize),

    #[error("shell program not found: {0}")]
    InvalidShellPath(String),

    #[error("terminal size must be non-zero, got {rows}x{cols}")]
    InvalidTerminalSize { rows: u16, cols: u16 },

    #[error("close_sequence must not be empty")]
    EmptyCloseSequence,

    #[error("command_prefix must not be empty or whitespace")]
    InvalidCommandPrefix,

    #[error("resize_poll_ms must be between 10 and 10000, got {0}")]
    InvalidResizePoll(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upper bound accepted for `session.max_sessions`.
const MAX_SESSIONS_LIMIT: usize = 256;

/// Main configuration structure for Deckshell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Shell program and PTY environment.
    pub shell: ShellConfig,

    /// Session management configuration.
    pub session: SessionConfig,

    /// Console front-end settings.
    pub console: ConsoleConfig,

    /// Logging settings.
    pub log: LogConfig,
}

/// Shell process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// Shell program to spawn for each session.
    pub program: String,

    /// Arguments passed to the shell.
    pub args: Vec<String>,

    /// Additional environment variables.
    pub env: BTreeMap<String, String>,

    /// Working directory for new sessions. Defaults to the current one.
    pub cwd: Option<PathBuf>,

    /// Value of `TERM`.
    pub term: String,

    /// Value of `COLORTERM`.
    pub colorterm: String,

    /// Initial terminal rows.
    pub rows: u16,

    /// Initial terminal columns.
    pub cols: u16,
}

/// Session management configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of concurrent sessions.
    pub max_sessions: usize,

    /// Input written to a shell to ask it to exit.
    pub close_sequence: String,
}

/// Console front-end configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Prefix that marks a console line as a command.
    pub command_prefix: String,

    /// Output kept per background session, in bytes.
    pub scrollback_bytes: usize,

    /// How often the terminal size is checked, in milliseconds.
    pub resize_poll_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Directory for daily rolling log files. Logs go to stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            term: "xterm-256color".to_string(),
            colorterm: "truecolor".to_string(),
            rows: 24,
            cols: 80,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 16,
            close_sequence: "exit\n".to_string(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            command_prefix: ":".to_string(),
            scrollback_bytes: 64 * 1024,
            resize_poll_ms: 250,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl ShellConfig {
    /// Returns the initial PTY size.
    pub fn initial_size(&self) -> Dimensions {
        Dimensions::new(self.rows, self.cols)
    }
}

impl SessionConfig {
    /// Returns the router settings derived from this section.
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            max_sessions: Some(self.max_sessions),
            close_sequence: self.close_sequence.as_bytes().to_vec(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deckshell")
        .join("config.toml")
}

/// Returns the default shell for the current platform.
fn default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - DECKSHELL_SHELL: Override the shell program
    /// - DECKSHELL_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(shell) = std::env::var("DECKSHELL_SHELL") {
            if !shell.is_empty() {
                tracing::info!("Overriding shell program from environment: {}", shell);
                self.shell.program = shell;
            }
        }

        if let Ok(level) = std::env::var("DECKSHELL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.log.level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.session.max_sessions;
        if !(1..=MAX_SESSIONS_LIMIT).contains(&max) {
            return Err(ConfigError::InvalidMaxSessions(max));
        }

        if self.session.close_sequence.is_empty() {
            return Err(ConfigError::EmptyCloseSequence);
        }

        if self.shell.rows == 0 || self.shell.cols == 0 {
            return Err(ConfigError::InvalidTerminalSize {
                rows: self.shell.rows,
                cols: self.shell.cols,
            });
        }

        if self.console.command_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidCommandPrefix);
        }

        if !(10..=10_000).contains(&self.console.resize_poll_ms) {
            return Err(ConfigError::InvalidResizePoll(self.console.resize_poll_ms));
        }

        // Absolute paths must exist, bare names must resolve through PATH
        let shell_path = Path::new(&self.shell.program);
        let shell_found = if shell_path.is_absolute() {
            shell_path.exists()
        } else {
            which::which(&self.shell.program).is_ok()
        };
        if !shell_found {
            return Err(ConfigError::InvalidShellPath(self.shell.program.clone()));
        }

        let level = self.log.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
