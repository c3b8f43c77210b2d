//! Output rendering for cmdwaitctl.
//!
//! Human mode passes the command's own output through and prints the failure
//! diagnostic on stderr. JSON mode prints one report object on stdout.

use cmdwait::{WaitFailure, WaitReport};
use cmdwait_core::{AttemptRecord, WaitSpec};
use serde::Serialize;
use std::io::Write;

/// Machine-readable summary of a finished wait.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub wait_id: &'a str,
    pub state: &'static str,
    pub command: &'a str,
    pub spec: &'a WaitSpec,
    pub exit_code: Option<i32>,
    pub attempts: &'a [AttemptRecord],
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'a str>,
}

impl<'a> JsonReport<'a> {
    pub fn success(report: &'a WaitReport, spec: &'a WaitSpec) -> Self {
        Self {
            wait_id: &report.wait_id.0,
            state: cmdwait_core::WaitState::Succeeded.as_str(),
            command: report.handle.display_line(),
            spec,
            exit_code: report.handle.try_exit_code(),
            attempts: &report.attempts,
            stdout: report.handle.stdout(),
            stderr: report.handle.stderr(),
            message: None,
        }
    }

    pub fn failure(failure: &'a WaitFailure, spec: &'a WaitSpec) -> Self {
        let last = failure.attempts.last();
        Self {
            wait_id: &failure.wait_id.0,
            state: failure.state.as_str(),
            command: &failure.command_line,
            spec,
            exit_code: failure.last_exit_code(),
            attempts: &failure.attempts,
            stdout: last.map(|a| a.stdout.clone()).unwrap_or_default(),
            stderr: last.map(|a| a.stderr.clone()).unwrap_or_default(),
            message: Some(&failure.message),
        }
    }
}

pub fn print_json(report: &JsonReport<'_>) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Replay the matching attempt's output on our own streams.
pub fn print_success(report: &WaitReport) -> eyre::Result<()> {
    std::io::stdout().write_all(report.handle.stdout().as_bytes())?;
    std::io::stderr().write_all(report.handle.stderr().as_bytes())?;
    if report.attempts.len() > 1 {
        eprintln!("succeeded after {} attempts", report.attempts.len());
    }
    Ok(())
}

pub fn print_failure(failure: &WaitFailure) {
    eprintln!("{}", failure.message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cmdwait_core::{AttemptState, WaitId, WaitState};
    use std::time::Duration;

    #[test]
    fn failure_report_carries_last_attempt_output() {
        let spec = WaitSpec::new(Duration::from_secs(1)).unwrap();
        let failure = WaitFailure {
            wait_id: WaitId::from_string("w-1"),
            state: WaitState::ExhaustedRetries,
            command_line: "sh -c exit 1".to_string(),
            message: "Failed executing command".to_string(),
            attempts: vec![AttemptRecord {
                attempt: 1,
                pid: Some(42),
                started_at: Utc::now(),
                elapsed_ms: 3,
                state: AttemptState::Completed { exit_code: 1 },
                stdout: "out\n".to_string(),
                stderr: "err\n".to_string(),
            }],
        };

        let json = serde_json::to_value(JsonReport::failure(&failure, &spec)).unwrap();

        assert_eq!(json["wait_id"], "w-1");
        assert_eq!(json["state"], "EXHAUSTED_RETRIES");
        assert_eq!(json["exit_code"], 1);
        assert_eq!(json["stdout"], "out\n");
        assert_eq!(json["attempts"][0]["state"]["kind"], "completed");
        assert_eq!(json["message"], "Failed executing command");
    }
}
