//! Core types for the command harness.
//!
//! A command is described once by a [`CommandDescription`], waited on under a
//! [`WaitSpec`], and every spawn-and-evaluate cycle leaves an [`AttemptRecord`]
//! behind for diagnostics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Identifier for one bounded-retry wait.
/// Uses `UUIDv7` so ids sort by creation time in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaitId(pub String);

impl WaitId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl Default for WaitId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WaitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An executable name plus its ordered argument list.
///
/// Arguments are kept verbatim: no shell interpretation, no quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandDescription {
    executable: String,
    args: Vec<String>,
}

impl CommandDescription {
    pub fn new<I, S>(executable: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            executable: executable.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Executable followed by the arguments, in spawn order.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.executable.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// The argv joined by single spaces.
    pub fn command_line(&self) -> String {
        self.argv().join(" ")
    }
}

impl std::fmt::Display for CommandDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("deadline must be greater than zero")]
    ZeroDeadline,
    #[error("max attempts must be at least 1")]
    ZeroAttempts,
}

/// Success criterion, deadline, and retry budget for a bounded-retry wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitSpec {
    expected_exit_code: i32,
    expected_output: String,
    max_attempts: u32,
    deadline: Duration,
}

impl WaitSpec {
    /// Expect exit code 0, any output, and a single attempt.
    pub fn new(deadline: Duration) -> Result<Self, SpecError> {
        if deadline.is_zero() {
            return Err(SpecError::ZeroDeadline);
        }
        Ok(Self {
            expected_exit_code: 0,
            expected_output: String::new(),
            max_attempts: 1,
            deadline,
        })
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.expected_exit_code = exit_code;
        self
    }

    /// Require the combined output to contain `output`. Empty matches anything.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.expected_output = output.into();
        self
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Result<Self, SpecError> {
        if max_attempts == 0 {
            return Err(SpecError::ZeroAttempts);
        }
        self.max_attempts = max_attempts;
        Ok(self)
    }

    pub fn expected_exit_code(&self) -> i32 {
        self.expected_exit_code
    }

    pub fn expected_output(&self) -> &str {
        &self.expected_output
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn output_matches(&self, output: &str) -> bool {
        self.expected_output.is_empty() || output.contains(&self.expected_output)
    }

    /// Exact exit-code equality and output containment.
    pub fn is_satisfied_by(&self, exit_code: i32, output: &str) -> bool {
        exit_code == self.expected_exit_code && self.output_matches(output)
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptState {
    Completed { exit_code: i32 },
    TimedOut,
    Cancelled,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Snapshot of one spawn-and-evaluate cycle, taken at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub state: AttemptState,
    pub stdout: String,
    pub stderr: String,
}

impl AttemptRecord {
    pub fn exit_code(&self) -> Option<i32> {
        match self.state {
            AttemptState::Completed { exit_code } => Some(exit_code),
            AttemptState::TimedOut | AttemptState::Cancelled => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.state == AttemptState::TimedOut
    }
}

/// States of the bounded-retry waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitState {
    Pending,
    AttemptRunning,
    AttemptTimedOut,
    AttemptCompleted,
    Succeeded,
    ExhaustedRetries,
    Cancelled,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AttemptRunning => "ATTEMPT_RUNNING",
            Self::AttemptTimedOut => "ATTEMPT_TIMED_OUT",
            Self::AttemptCompleted => "ATTEMPT_COMPLETED",
            Self::Succeeded => "SUCCEEDED",
            Self::ExhaustedRetries => "EXHAUSTED_RETRIES",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::ExhaustedRetries | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_preserves_order_and_content() {
        let cmd = CommandDescription::new("bash", ["-c", "echo 'a  b'; exit 3", ""]);
        assert_eq!(cmd.argv(), vec!["bash", "-c", "echo 'a  b'; exit 3", ""]);
        assert_eq!(cmd.command_line(), "bash -c echo 'a  b'; exit 3 ");
    }

    #[test]
    fn wait_spec_defaults() {
        let spec = WaitSpec::new(Duration::from_secs(5)).unwrap();
        assert_eq!(spec.expected_exit_code(), 0);
        assert_eq!(spec.expected_output(), "");
        assert_eq!(spec.max_attempts(), 1);
        assert_eq!(spec.deadline(), Duration::from_secs(5));
    }

    #[test]
    fn wait_spec_rejects_zero_deadline() {
        assert_eq!(
            WaitSpec::new(Duration::ZERO).unwrap_err(),
            SpecError::ZeroDeadline
        );
    }

    #[test]
    fn wait_spec_rejects_zero_attempts() {
        let spec = WaitSpec::new(Duration::from_secs(1)).unwrap();
        assert_eq!(spec.with_attempts(0).unwrap_err(), SpecError::ZeroAttempts);
    }

    #[test]
    fn empty_expected_output_always_matches() {
        let spec = WaitSpec::new(Duration::from_secs(1)).unwrap();
        assert!(spec.output_matches(""));
        assert!(spec.output_matches("anything"));
    }

    #[test]
    fn satisfaction_requires_exact_exit_code_and_output() {
        let spec = WaitSpec::new(Duration::from_secs(1))
            .unwrap()
            .with_exit_code(42)
            .with_output("hi out");
        assert!(spec.is_satisfied_by(42, "say hi out\n"));
        assert!(!spec.is_satisfied_by(0, "say hi out\n"));
        assert!(!spec.is_satisfied_by(42, "hi err\n"));
    }

    #[test]
    fn attempt_record_exit_code_only_when_completed() {
        let mut record = AttemptRecord {
            attempt: 1,
            pid: Some(10),
            started_at: Utc::now(),
            elapsed_ms: 5,
            state: AttemptState::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(record.timed_out());
        assert_eq!(record.exit_code(), None);

        record.state = AttemptState::Completed { exit_code: 7 };
        assert!(!record.timed_out());
        assert_eq!(record.exit_code(), Some(7));
    }

    #[test]
    fn attempt_state_serializes_with_kind_tag() {
        let json = serde_json::to_value(AttemptState::Completed { exit_code: 1 }).unwrap();
        assert_eq!(json["kind"], "completed");
        assert_eq!(json["exit_code"], 1);
    }

    #[test]
    fn terminal_wait_states() {
        assert!(WaitState::Succeeded.is_terminal());
        assert!(WaitState::ExhaustedRetries.is_terminal());
        assert!(WaitState::Cancelled.is_terminal());
        assert!(!WaitState::AttemptTimedOut.is_terminal());
        assert_eq!(WaitState::ExhaustedRetries.as_str(), "EXHAUSTED_RETRIES");
    }
}
