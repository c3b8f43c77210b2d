use cmdwait_core::{AttemptRecord, SpecError, WaitId, WaitState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("executable not found: {executable}")]
    NotFound { executable: String },
    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: std::io::Error,
    },
    #[error("commands must be started inside a tokio runtime")]
    NoRuntime,
    #[error("invalid wait spec: {0}")]
    Spec(#[from] SpecError),
    #[error("{message}")]
    TimedOut { message: String },
    #[error(transparent)]
    Wait(#[from] WaitFailure),
    /// A retry could not be spawned. `message` describes the attempts made so far.
    #[error("failed to start attempt {attempt}; earlier attempts:\n{message}")]
    Respawn {
        attempt: u32,
        message: String,
        attempts: Vec<AttemptRecord>,
        #[source]
        source: Box<HarnessError>,
    },
    #[error("process supervisor stopped without reporting an exit code")]
    SupervisorLost,
}

pub type Result<T> = std::result::Result<T, HarnessError>;

/// A bounded-retry wait that ended without success.
///
/// `message` is the full diagnostic: deadline, attempt count, command line,
/// and the final attempt's stdout and stderr.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WaitFailure {
    pub wait_id: WaitId,
    /// `ExhaustedRetries` or `Cancelled`.
    pub state: WaitState,
    pub command_line: String,
    pub message: String,
    pub attempts: Vec<AttemptRecord>,
}

impl WaitFailure {
    /// True when the final attempt hit the deadline instead of completing.
    pub fn timed_out(&self) -> bool {
        self.attempts.last().is_some_and(AttemptRecord::timed_out)
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.attempts.last().and_then(AttemptRecord::exit_code)
    }
}
