//! Command starter: intercept, report, and spawn.
//!
//! `start` builds the description, passes it through the interceptor, reports
//! the redacted effective command, spawns it, and returns without waiting.
//! A failed spawn is returned to the caller as-is; retrying is the waiter's job.

use crate::error::Result;
use crate::handle::ProcessHandle;
use crate::interceptor::{self, Interceptor};
use crate::reporter::{CommandReporter, Reporter};
use chrono::Utc;
use cmdwait_core::{CommandDescription, PositionalRule, RedactionRules};
use std::sync::Arc;

/// Something that can turn a command description into a running process.
///
/// Must be called from inside a tokio runtime.
pub trait Starter: Send + Sync {
    fn start_command(&self, command: CommandDescription) -> Result<ProcessHandle>;

    fn start<I, S>(&self, executable: &str, args: I) -> Result<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        Self: Sized,
    {
        self.start_command(CommandDescription::new(executable, args))
    }
}

#[derive(Clone)]
pub struct CommandStarter {
    reporter: Arc<dyn Reporter>,
    interceptor: Option<Interceptor>,
    rules: RedactionRules,
}

impl CommandStarter {
    /// Reports to stderr with the built-in redaction rules and the global interceptor.
    pub fn new() -> Self {
        Self::with_reporter(Arc::new(CommandReporter::new()))
    }

    pub fn with_reporter(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            interceptor: None,
            rules: RedactionRules::default(),
        }
    }

    /// Use `interceptor` instead of the process-wide one.
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_rules(mut self, rules: RedactionRules) -> Self {
        self.rules = rules;
        self
    }

    /// Also hide `secret` wherever it appears in a reported command line.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.rules = self.rules.with_secret(secret);
        self
    }

    pub fn with_positional(mut self, rule: PositionalRule) -> Self {
        self.rules = self.rules.with_positional(rule);
        self
    }

    pub fn rules(&self) -> &RedactionRules {
        &self.rules
    }

    fn interceptor(&self) -> Interceptor {
        self.interceptor.clone().unwrap_or_else(interceptor::global)
    }
}

impl Default for CommandStarter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommandStarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStarter")
            .field("interceptor", &self.interceptor)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Starter for CommandStarter {
    fn start_command(&self, requested: CommandDescription) -> Result<ProcessHandle> {
        let effective = self.interceptor().apply(requested.clone());
        let shown = self.rules.redact_description(&effective);
        self.reporter.report(Utc::now(), &shown);
        ProcessHandle::spawn(requested, effective, shown.command_line())
    }
}

impl<T: Starter + ?Sized> Starter for Arc<T> {
    fn start_command(&self, command: CommandDescription) -> Result<ProcessHandle> {
        (**self).start_command(command)
    }
}
