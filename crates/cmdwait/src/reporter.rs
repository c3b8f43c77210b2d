//! Command reporter: one audit line per spawned command.
//!
//! Line format: `[<timestamp>]> <argv joined by spaces>`. The starter redacts
//! the command before it gets here, so reporters format what they are given.

use chrono::{DateTime, Utc};
use cmdwait_core::CommandDescription;
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const START_COLOR: &str = "\x1b[32m";
const END_COLOR: &str = "\x1b[0m";

/// Receives every command right before it is spawned.
pub trait Reporter: Send + Sync {
    fn report(&self, at: DateTime<Utc>, command: &CommandDescription);
}

/// UTC timestamp with centisecond precision, e.g. `2024-01-02 15:04:05.00 (UTC)`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    format!(
        "{}.{:02} (UTC)",
        at.format(TIME_FORMAT),
        at.timestamp_subsec_millis() / 10
    )
}

/// Writes report lines to a shared output stream (stderr by default).
#[derive(Clone)]
pub struct CommandReporter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    color: bool,
}

impl CommandReporter {
    pub fn new() -> Self {
        Self::with_writer(std::io::stderr())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            color: true,
        }
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    pub fn format_line(&self, at: DateTime<Utc>, command: &CommandDescription) -> String {
        let (start, end) = if self.color {
            (START_COLOR, END_COLOR)
        } else {
            ("", "")
        };
        format!(
            "{start}[{}]> {}{end}\n",
            format_timestamp(at),
            command.command_line()
        )
    }
}

impl Default for CommandReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandReporter")
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

impl Reporter for CommandReporter {
    fn report(&self, at: DateTime<Utc>, command: &CommandDescription) {
        debug!(command = %command, "starting command");

        let line = self.format_line(at, command);
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writer.write_all(line.as_bytes()).and_then(|()| writer.flush()) {
            warn!(error = %err, "failed to write command report");
        }
    }
}
