//! Live handle to a spawned subprocess.
//!
//! The child is owned by a supervisor task that races process exit against a
//! kill request, drains the output readers, and then publishes the exit code
//! exactly once. Output is appended into lock-guarded buffers as it arrives,
//! so callers can snapshot stdout and stderr before the process finishes.

use crate::error::{HarnessError, Result};
use chrono::{DateTime, Utc};
use cmdwait_core::diagnostic::failure_message;
use cmdwait_core::{AttemptRecord, AttemptState, CommandDescription, WaitSpec};
use std::io::Write;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Timeout for draining stdout/stderr after the process exits or is killed.
///
/// A grandchild that inherited the pipes can keep them open long after the
/// direct child is gone.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shorter drain window once the process has been killed.
const KILLED_CAPTURE_TIMEOUT: Duration = Duration::from_millis(500);

/// Maximum bytes kept per stream. Excess output is drained and dropped.
pub const MAX_OUTPUT_BYTES: usize = 50 * 1024 * 1024;

/// Exit code reported for a process that ended without one (killed by a signal).
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Append-only byte buffer shared between one writer and any number of readers.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append as much of `bytes` as fits under `max_bytes`; returns the count kept.
    pub fn append(&self, bytes: &[u8], max_bytes: usize) -> usize {
        let mut buf = self.lock();
        let to_take = bytes.len().min(max_bytes.saturating_sub(buf.len()));
        buf.extend_from_slice(&bytes[..to_take]);
        to_take
    }

    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Snapshot as UTF-8, replacing invalid sequences.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        needle.is_empty() || self.contents_lossy().contains(needle)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Copy a child stream into its own buffer and the combined buffer.
async fn capture<R: AsyncRead + Unpin>(
    mut reader: R,
    own: OutputBuffer,
    combined: OutputBuffer,
    max_bytes: usize,
) -> std::io::Result<usize> {
    let mut chunk = [0u8; 8192];
    let mut total = 0;
    let mut truncated = false;

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        total += n;

        let kept = own.append(&chunk[..n], max_bytes);
        combined.append(&chunk[..kept], max_bytes.saturating_mul(2));
        if kept < n && !truncated {
            warn!(max_bytes, "output exceeded limit, truncating");
            truncated = true;
        }
    }

    Ok(total)
}

/// Kill the child together with everything it started.
///
/// On unix the child leads its own process group, so grandchildren that hold
/// the output pipes die with it. Falls back to killing the direct child.
async fn kill_process_group(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = pid {
            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => {
                    debug!(pid, "process group killed");
                    return;
                }
                Err(err) => warn!(pid, error = %err, "failed to kill process group; killing child only"),
            }
        }
    }

    if let Err(err) = child.kill().await {
        warn!(pid, error = %err, "failed to kill process");
    }
}

/// Own the child until it exits, then publish its exit code once.
async fn supervise(
    mut child: Child,
    readers: Vec<JoinHandle<std::io::Result<usize>>>,
    kill: CancellationToken,
    exit_tx: watch::Sender<Option<i32>>,
    pid: Option<u32>,
) {
    let (status, drain) = tokio::select! {
        result = child.wait() => (result, IO_CAPTURE_TIMEOUT),
        () = kill.cancelled() => {
            debug!(pid, "kill requested");
            kill_process_group(&mut child, pid).await;
            (child.wait().await, KILLED_CAPTURE_TIMEOUT)
        }
    };

    // Completion implies the buffers hold everything the process wrote.
    let drain_deadline = tokio::time::Instant::now() + drain;
    for reader in readers {
        match timeout_at(drain_deadline, reader).await {
            Ok(Ok(Ok(bytes))) => debug!(pid, bytes, "output stream closed"),
            Ok(Ok(Err(err))) => warn!(pid, error = %err, "output capture failed"),
            Ok(Err(err)) => warn!(pid, error = %err, "output capture task panicked"),
            Err(_) => warn!(pid, "output capture timed out"),
        }
    }

    let exit_code = match status {
        Ok(status) => status.code().unwrap_or(SIGNALED_EXIT_CODE),
        Err(err) => {
            warn!(pid, error = %err, "failed to wait for process");
            SIGNALED_EXIT_CODE
        }
    };
    debug!(pid, exit_code, "process exited");
    let _ = exit_tx.send(Some(exit_code));
}

/// A spawned subprocess with live-readable output and an eventual exit code.
///
/// Reading the exit code blocks until the process has completed; use
/// [`ProcessHandle::try_exit_code`] for a non-blocking check.
#[derive(Debug)]
pub struct ProcessHandle {
    requested: CommandDescription,
    effective: CommandDescription,
    display_line: String,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    started: Instant,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    combined: OutputBuffer,
    exit_rx: watch::Receiver<Option<i32>>,
    kill: CancellationToken,
}

impl ProcessHandle {
    /// Spawn `effective` with both output streams captured.
    ///
    /// `requested` is the command before interception, kept so a retry can
    /// start it again; `display_line` is the redacted command line used in
    /// diagnostics.
    pub(crate) fn spawn(
        requested: CommandDescription,
        effective: CommandDescription,
        display_line: String,
    ) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(HarnessError::NoRuntime);
        }

        let mut command = Command::new(effective.executable());
        command
            .args(effective.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // New group led by the child, so a kill reaches its descendants too.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|source| {
                if source.kind() == std::io::ErrorKind::NotFound {
                    HarnessError::NotFound {
                        executable: effective.executable().to_string(),
                    }
                } else {
                    HarnessError::Spawn {
                        executable: effective.executable().to_string(),
                        source,
                    }
                }
            })?;

        let pid = child.id();
        let stdout = OutputBuffer::new();
        let stderr = OutputBuffer::new();
        let combined = OutputBuffer::new();

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(capture(
                out,
                stdout.clone(),
                combined.clone(),
                MAX_OUTPUT_BYTES,
            )));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(capture(
                err,
                stderr.clone(),
                combined.clone(),
                MAX_OUTPUT_BYTES,
            )));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        tokio::spawn(supervise(child, readers, kill.clone(), exit_tx, pid));

        debug!(pid, command = %display_line, "process spawned");

        Ok(Self {
            requested,
            effective,
            display_line,
            pid,
            started_at: Utc::now(),
            started: Instant::now(),
            stdout,
            stderr,
            combined,
            exit_rx,
            kill,
        })
    }

    /// The command as handed to the starter, before interception.
    pub fn requested(&self) -> &CommandDescription {
        &self.requested
    }

    /// The command that was actually spawned.
    pub fn command(&self) -> &CommandDescription {
        &self.effective
    }

    pub fn argv(&self) -> Vec<&str> {
        self.effective.argv()
    }

    /// Redacted command line, as reported at spawn time.
    pub fn display_line(&self) -> &str {
        &self.display_line
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stdout(&self) -> String {
        self.stdout.contents_lossy()
    }

    pub fn stderr(&self) -> String {
        self.stderr.contents_lossy()
    }

    /// Stdout and stderr interleaved in arrival order.
    pub fn output(&self) -> String {
        self.combined.contents_lossy()
    }

    pub fn stdout_buffer(&self) -> &OutputBuffer {
        &self.stdout
    }

    pub fn stderr_buffer(&self) -> &OutputBuffer {
        &self.stderr
    }

    pub fn is_done(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Exit code if the process has completed, without waiting.
    pub fn try_exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// Exit code, waiting for completion first.
    pub async fn exit_code(&self) -> Result<i32> {
        let mut rx = self.exit_rx.clone();
        let code = *rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| HarnessError::SupervisorLost)?;
        code.ok_or(HarnessError::SupervisorLost)
    }

    /// Ask the supervisor to kill the process. Has no effect once it exited.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Block until the process completes or `deadline` elapses.
    ///
    /// On timeout the process is killed and the error carries a diagnostic
    /// with the output captured so far. The exit code is not checked.
    pub async fn wait(self, deadline: Duration) -> Result<Self> {
        let spec = WaitSpec::new(deadline)?;
        match timeout(deadline, self.exit_code()).await {
            Ok(result) => {
                result?;
                Ok(self)
            }
            Err(_) => {
                let record = self.snapshot(1, AttemptState::TimedOut, self.elapsed());
                self.kill();
                Err(HarnessError::TimedOut {
                    message: failure_message(&self.display_line, &spec, &[record]),
                })
            }
        }
    }

    /// Freeze the current buffers into an attempt record.
    pub(crate) fn snapshot(
        &self,
        attempt: u32,
        state: AttemptState,
        elapsed: Duration,
    ) -> AttemptRecord {
        AttemptRecord {
            attempt,
            pid: self.pid,
            started_at: self.started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            state,
            stdout: self.stdout(),
            stderr: self.stderr(),
        }
    }
}
