//! Failure messages for bounded-retry waits.
//!
//! The header distinguishes a hang ("Timed out executing command") from a
//! completed-but-mismatched run ("Failed executing command" or an output
//! mismatch), and the body always carries the command line and the final
//! attempt's stdout and stderr.

use crate::types::{AttemptRecord, AttemptState, WaitSpec};
use std::fmt::Write as _;

/// Build the failure message for a wait that did not succeed.
///
/// `command_line` is printed as given; callers pass the already-redacted line.
pub fn failure_message(command_line: &str, spec: &WaitSpec, attempts: &[AttemptRecord]) -> String {
    let count = attempts.len();
    let deadline = spec.deadline();

    let Some(last) = attempts.last() else {
        return format!(
            "No attempts made executing command ({deadline:?} deadline):\nCommand: {command_line}\n"
        );
    };

    let mut message = match last.state {
        AttemptState::TimedOut => format!(
            "Timed out executing command ({deadline:?}) after {count} attempt(s):"
        ),
        AttemptState::Cancelled => format!(
            "Cancelled executing command ({deadline:?} deadline) after {count} attempt(s):"
        ),
        AttemptState::Completed { exit_code } if exit_code != spec.expected_exit_code() => {
            format!(
                "Failed executing command (exit {exit_code}, expected {}) after {count} attempt(s) ({deadline:?} deadline):",
                spec.expected_exit_code()
            )
        }
        AttemptState::Completed { exit_code } => format!(
            "Failed executing command (exit {exit_code}): output did not contain {:?} after {count} attempt(s) ({deadline:?} deadline):",
            spec.expected_output()
        ),
    };

    let _ = write!(
        message,
        "\nCommand: {command_line}\n\n[stdout]:\n{}\n\n[stderr]:\n{}",
        last.stdout, last.stderr
    );

    if count > 1 {
        message.push_str("\n\n[attempts]:");
        for record in attempts {
            let outcome = match record.state {
                AttemptState::Completed { exit_code } => format!("exit {exit_code}"),
                AttemptState::TimedOut => "timed out".to_string(),
                AttemptState::Cancelled => "cancelled".to_string(),
            };
            let _ = write!(
                message,
                "\n  #{} {outcome} after {}ms",
                record.attempt, record.elapsed_ms
            );
        }
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn record(attempt: u32, state: AttemptState, stdout: &str, stderr: &str) -> AttemptRecord {
        AttemptRecord {
            attempt,
            pid: None,
            started_at: Utc::now(),
            elapsed_ms: 12,
            state,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn exit_mismatch_names_actual_and_expected_codes() {
        let spec = WaitSpec::new(Duration::from_secs(30)).unwrap();
        let attempts = vec![record(
            1,
            AttemptState::Completed { exit_code: 42 },
            "hi out\n",
            "hi err\n",
        )];
        let message = failure_message("bash -c exit 42", &spec, &attempts);
        assert_eq!(
            message,
            "Failed executing command (exit 42, expected 0) after 1 attempt(s) (30s deadline):\n\
             Command: bash -c exit 42\n\n[stdout]:\nhi out\n\n\n[stderr]:\nhi err\n"
        );
    }

    #[test]
    fn timeout_is_framed_as_timeout() {
        let spec = WaitSpec::new(Duration::from_millis(100)).unwrap();
        let attempts = vec![record(1, AttemptState::TimedOut, "partial", "")];
        let message = failure_message("sleep 10", &spec, &attempts);
        assert!(message.starts_with("Timed out executing command (100ms) after 1 attempt(s):"));
        assert!(message.contains("Command: sleep 10"));
        assert!(message.contains("[stdout]:\npartial"));
        assert!(!message.contains("Failed executing"));
    }

    #[test]
    fn output_mismatch_names_expected_substring() {
        let spec = WaitSpec::new(Duration::from_secs(1))
            .unwrap()
            .with_output("ready");
        let attempts = vec![record(1, AttemptState::Completed { exit_code: 0 }, "booting", "")];
        let message = failure_message("app start", &spec, &attempts);
        assert!(message.contains("output did not contain \"ready\""));
        assert!(message.contains("(exit 0)"));
    }

    #[test]
    fn multiple_attempts_are_summarized_with_last_output() {
        let spec = WaitSpec::new(Duration::from_secs(1))
            .unwrap()
            .with_attempts(2)
            .unwrap();
        let attempts = vec![
            record(1, AttemptState::TimedOut, "first", ""),
            record(2, AttemptState::Completed { exit_code: 1 }, "second", "boom"),
        ];
        let message = failure_message("false", &spec, &attempts);
        assert!(message.contains("after 2 attempt(s)"));
        assert!(message.contains("[stdout]:\nsecond"));
        assert!(message.contains("[stderr]:\nboom"));
        assert!(!message.contains("[stdout]:\nfirst"));
        assert!(message.contains("#1 timed out"));
        assert!(message.contains("#2 exit 1"));
    }
}
