//! Configuration for command waits.
//!
//! Key=value format with `#` comments and optional quotes, read from
//! `.cmdwait/config` or an explicit `--config` file.
//! Precedence: CLI flags > `--config` file > `.cmdwait/config` > defaults.

use crate::redact::RedactionRules;
use crate::types::{SpecError, WaitSpec};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
}

/// Default per-attempt deadline.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    /// Maximum spawns per wait.
    pub attempts: u32,
    /// Exit code that counts as success.
    pub exit_code: i32,
    /// Substring the combined output must contain (empty = any).
    pub expect_output: String,
    /// Disable ANSI colour in the command report line.
    pub no_color: bool,
    /// Pass `--insecure` to curl.
    pub skip_ssl_validation: bool,
    /// Platform CLI used by the auth helper.
    pub cli_bin: String,
    /// Literal strings hidden from report lines.
    pub redact_secrets: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            attempts: 1,
            exit_code: 0,
            expect_output: String::new(),
            no_color: false,
            skip_ssl_validation: false,
            cli_bin: "cf".to_string(),
            redact_secrets: Vec::new(),
        }
    }
}

impl Config {
    /// Workspace-local config path: `<root>/.cmdwait/config`.
    pub fn default_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".cmdwait").join("config")
    }

    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            return value[1..value.len() - 1].to_string();
        }
        value.to_string()
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "timeout_ms" => self.timeout_ms = Self::parse_int(key, value)?,
            "timeout_sec" => {
                let secs: u64 = Self::parse_int(key, value)?;
                self.timeout_ms = secs.saturating_mul(1000);
            }
            "attempts" => self.attempts = Self::parse_int(key, value)?,
            "exit_code" => self.exit_code = Self::parse_int(key, value)?,
            "expect_output" => self.expect_output = value.to_string(),
            "no_color" => self.no_color = Self::parse_bool(key, value)?,
            "skip_ssl_validation" => self.skip_ssl_validation = Self::parse_bool(key, value)?,
            "cli_bin" => self.cli_bin = value.to_string(),
            "redact_secrets" => {
                // Pipe-separated list of literals
                self.redact_secrets = value
                    .split('|')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            _ => {
                // Warn but don't fail for unknown keys
                eprintln!("Warning: unknown config key: {key}");
            }
        }
        Ok(())
    }

    fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Wait spec built from these settings. Rejects a zero timeout or zero attempts.
    pub fn wait_spec(&self) -> Result<WaitSpec, SpecError> {
        WaitSpec::new(self.timeout())?
            .with_exit_code(self.exit_code)
            .with_output(self.expect_output.clone())
            .with_attempts(self.attempts)
    }

    /// Built-in redaction rules plus the configured literal secrets.
    pub fn redaction_rules(&self) -> RedactionRules {
        RedactionRules::default().with_secrets(self.redact_secrets.iter().cloned())
    }
}
