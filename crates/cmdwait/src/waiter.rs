//! Bounded-retry waiter.
//!
//! Drives a command to completion under a per-attempt deadline, re-spawning
//! it through the starter until the exit code and output match or the attempt
//! budget runs out. Each attempt is a race between process exit, the deadline,
//! and an optional cancellation token. A slow heartbeat branch logs progress
//! during long waits.

use crate::error::{HarnessError, Result, WaitFailure};
use crate::handle::ProcessHandle;
use crate::starter::Starter;
use cmdwait_core::diagnostic::failure_message;
use cmdwait_core::{AttemptRecord, AttemptState, CommandDescription, WaitId, WaitSpec, WaitState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between progress log lines while an attempt is running.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a killed attempt to be reaped before retrying.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Result of a successful wait.
#[derive(Debug)]
pub struct WaitReport {
    pub wait_id: WaitId,
    /// Handle of the attempt that matched.
    pub handle: ProcessHandle,
    pub attempts: Vec<AttemptRecord>,
}

impl WaitReport {
    pub fn into_handle(self) -> ProcessHandle {
        self.handle
    }
}

/// Waits on a command with a success criterion, deadline, and retry budget.
pub struct CmdWaiter {
    id: WaitId,
    starter: Arc<dyn Starter>,
    spec: WaitSpec,
    cancel: CancellationToken,
}

impl CmdWaiter {
    /// `starter` is used to re-spawn the command on retries.
    pub fn new(starter: Arc<dyn Starter>, spec: WaitSpec) -> Self {
        Self {
            id: WaitId::new(),
            starter,
            spec,
            cancel: CancellationToken::new(),
        }
    }

    /// End the wait early when `token` is cancelled. Cancellation is never retried.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> &WaitId {
        &self.id
    }

    pub fn spec(&self) -> &WaitSpec {
        &self.spec
    }

    /// Wait on `first`, retrying with fresh spawns of the same command.
    ///
    /// Retries start the command as originally requested, so the interceptor
    /// runs once per spawn. Attempts are strictly sequential.
    pub async fn run(&self, first: ProcessHandle) -> Result<WaitReport> {
        let max_attempts = self.spec.max_attempts();
        let requested: CommandDescription = first.requested().clone();
        let mut handle = first;
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        debug!(
            wait_id = %self.id,
            state = WaitState::Pending.as_str(),
            max_attempts,
            deadline_ms = self.spec.deadline().as_millis() as u64,
            "wait pending"
        );

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                handle = match self.starter.start_command(requested.clone()) {
                    Ok(next) => next,
                    Err(err) => return Err(self.respawn_failure(attempt, &handle, attempts, err)),
                };
            }

            info!(
                wait_id = %self.id,
                state = WaitState::AttemptRunning.as_str(),
                attempt,
                max_attempts,
                pid = handle.pid(),
                command = %handle.display_line(),
                "waiting on command"
            );

            let record = self.await_attempt(&handle, attempt, attempt < max_attempts).await?;
            let state = record.state;
            attempts.push(record);

            match state {
                AttemptState::Cancelled => {
                    return Err(self.failure(WaitState::Cancelled, &handle, attempts));
                }
                AttemptState::TimedOut => {
                    warn!(
                        wait_id = %self.id,
                        state = WaitState::AttemptTimedOut.as_str(),
                        attempt,
                        deadline_ms = self.spec.deadline().as_millis() as u64,
                        "attempt timed out"
                    );
                }
                AttemptState::Completed { exit_code } => {
                    if self.spec.is_satisfied_by(exit_code, &handle.output()) {
                        info!(
                            wait_id = %self.id,
                            state = WaitState::Succeeded.as_str(),
                            attempt,
                            exit_code,
                            "command succeeded"
                        );
                        return Ok(WaitReport {
                            wait_id: self.id.clone(),
                            handle,
                            attempts,
                        });
                    }
                    warn!(
                        wait_id = %self.id,
                        state = WaitState::AttemptCompleted.as_str(),
                        attempt,
                        exit_code,
                        expected_exit_code = self.spec.expected_exit_code(),
                        "attempt did not match"
                    );
                }
            }
        }

        Err(self.failure(WaitState::ExhaustedRetries, &handle, attempts))
    }

    /// Race completion, the deadline, and cancellation for one attempt.
    ///
    /// A timed-out or cancelled process is killed after its output is frozen
    /// into the record. When `will_retry` is set the kill is also awaited, so
    /// the next attempt never overlaps this one.
    async fn await_attempt(
        &self,
        handle: &ProcessHandle,
        attempt: u32,
        will_retry: bool,
    ) -> Result<AttemptRecord> {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.spec.deadline());
        tokio::pin!(deadline);

        let state = loop {
            let heartbeat = tokio::time::sleep(HEARTBEAT_INTERVAL);

            tokio::select! {
                biased;

                result = handle.exit_code() => {
                    break AttemptState::Completed { exit_code: result? };
                }
                () = &mut deadline => break AttemptState::TimedOut,
                () = self.cancel.cancelled() => {
                    info!(wait_id = %self.id, attempt, "cancellation requested; killing process");
                    break AttemptState::Cancelled;
                }
                () = heartbeat => {
                    info!(
                        wait_id = %self.id,
                        attempt,
                        pid = handle.pid(),
                        elapsed_sec = started.elapsed().as_secs(),
                        deadline_sec = self.spec.deadline().as_secs(),
                        "command still running"
                    );
                }
            }
        };

        let record = handle.snapshot(attempt, state, started.elapsed());

        if !matches!(state, AttemptState::Completed { .. }) {
            handle.kill();
            if will_retry && state == AttemptState::TimedOut {
                match timeout(REAP_TIMEOUT, handle.exit_code()).await {
                    Ok(Ok(exit_code)) => debug!(wait_id = %self.id, attempt, exit_code, "timed-out process reaped"),
                    Ok(Err(err)) => warn!(wait_id = %self.id, attempt, error = %err, "failed to reap timed-out process"),
                    Err(_) => warn!(wait_id = %self.id, attempt, "timed-out process still running after kill"),
                }
            }
        }

        Ok(record)
    }

    fn failure(
        &self,
        state: WaitState,
        handle: &ProcessHandle,
        attempts: Vec<AttemptRecord>,
    ) -> HarnessError {
        let command_line = handle.display_line().to_string();
        let message = failure_message(&command_line, &self.spec, &attempts);

        warn!(
            wait_id = %self.id,
            state = state.as_str(),
            attempts = attempts.len(),
            command = %command_line,
            "command wait failed"
        );

        HarnessError::Wait(WaitFailure {
            wait_id: self.id.clone(),
            state,
            command_line,
            message,
            attempts,
        })
    }
}

impl CmdWaiter {
    /// Keep the attempts made so far when a retry cannot be spawned.
    fn respawn_failure(
        &self,
        attempt: u32,
        previous: &ProcessHandle,
        attempts: Vec<AttemptRecord>,
        source: HarnessError,
    ) -> HarnessError {
        let message = failure_message(previous.display_line(), &self.spec, &attempts);

        warn!(
            wait_id = %self.id,
            attempt,
            error = %source,
            "failed to start retry"
        );

        HarnessError::Respawn {
            attempt,
            message,
            attempts,
            source: Box::new(source),
        }
    }
}

impl std::fmt::Debug for CmdWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmdWaiter")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Start `executable args` and wait on it under `spec`, retrying as needed.
pub async fn wait_with_retry<I, S>(
    starter: Arc<dyn Starter>,
    executable: &str,
    args: I,
    spec: WaitSpec,
) -> Result<ProcessHandle>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let first = starter.start_command(CommandDescription::new(executable, args))?;
    let report = CmdWaiter::new(starter, spec).run(first).await?;
    Ok(report.into_handle())
}
