//! Redaction of sensitive arguments before a command is logged.
//!
//! Two kinds of rule are supported:
//! - positional: for a recognized command shape such as `<cli> auth <user> <password>`,
//!   the argument a fixed distance after the subcommand is replaced wholesale
//! - literal: any occurrence of a registered secret string is replaced
//!
//! Redaction applies to formatted command lines only. Captured process output
//! is never scrubbed here.

use crate::types::CommandDescription;

/// Placeholder substituted for a sensitive value.
pub const REDACTED: &str = "[REDACTED]";

/// Replace the argument `offset` places after `subcommand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionalRule {
    pub subcommand: String,
    pub offset: usize,
}

impl PositionalRule {
    pub fn new(subcommand: impl Into<String>, offset: usize) -> Self {
        Self {
            subcommand: subcommand.into(),
            offset,
        }
    }

    /// Index into argv that this rule hides, if the command has this shape.
    ///
    /// The subcommand is recognized either as the executable itself
    /// (`auth user pass`) or as the first argument (`cf auth user pass`).
    fn target_index(&self, argv: &[&str]) -> Option<usize> {
        let position = argv
            .iter()
            .take(2)
            .position(|arg| *arg == self.subcommand)?;
        let target = position + self.offset;
        (target < argv.len()).then_some(target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionRules {
    positional: Vec<PositionalRule>,
    secrets: Vec<String>,
}

impl Default for RedactionRules {
    /// Built-in rules: hide the password of `auth <user> <password>`.
    fn default() -> Self {
        Self {
            positional: vec![PositionalRule::new("auth", 2)],
            secrets: Vec::new(),
        }
    }
}

impl RedactionRules {
    /// No rules at all; every argument is logged verbatim.
    pub fn none() -> Self {
        Self {
            positional: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn with_positional(mut self, rule: PositionalRule) -> Self {
        self.positional.push(rule);
        self
    }

    /// Hide every occurrence of `secret`. Empty secrets are ignored.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() && !self.secrets.contains(&secret) {
            self.secrets.push(secret);
        }
        self
    }

    pub fn with_secrets<I, S>(self, secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        secrets
            .into_iter()
            .fold(self, |rules, secret| rules.with_secret(secret))
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.secrets.is_empty()
    }

    /// Redacted copy of `argv`; order and length are preserved.
    ///
    /// A value hidden by a positional rule is also treated as a literal secret
    /// for this line, so a password repeated elsewhere in argv never leaks.
    pub fn redact_argv(&self, argv: &[&str]) -> Vec<String> {
        let targets: Vec<usize> = self
            .positional
            .iter()
            .filter_map(|rule| rule.target_index(argv))
            .collect();
        let line_rules = targets
            .iter()
            .fold(self.clone(), |rules, &index| rules.with_secret(argv[index]));

        let mut out: Vec<String> = argv.iter().map(|arg| line_rules.redact_text(arg)).collect();
        for index in targets {
            out[index] = REDACTED.to_string();
        }
        out
    }

    /// Redacted command line, argv joined by single spaces.
    pub fn redact_command(&self, cmd: &CommandDescription) -> String {
        self.redact_argv(&cmd.argv()).join(" ")
    }

    /// Redacted copy of the description, suitable for handing to a reporter.
    pub fn redact_description(&self, cmd: &CommandDescription) -> CommandDescription {
        let mut argv = self.redact_argv(&cmd.argv()).into_iter();
        let executable = argv.next().unwrap_or_default();
        CommandDescription::new(executable, argv)
    }

    /// Replace literal secrets in free text.
    pub fn redact_text(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_password_is_hidden_after_cli_name() {
        let cmd = CommandDescription::new("cf", ["auth", "myUser", "superSecretPassword"]);
        let line = RedactionRules::default().redact_command(&cmd);
        assert_eq!(line, "cf auth myUser [REDACTED]");
        assert!(!line.contains("superSecretPassword"));
    }

    #[test]
    fn auth_password_is_hidden_when_auth_is_the_executable() {
        let cmd = CommandDescription::new("auth", ["myUser", "superSecretPassword"]);
        let line = RedactionRules::default().redact_command(&cmd);
        assert_eq!(line, "auth myUser [REDACTED]");
    }

    #[test]
    fn short_auth_command_is_left_alone() {
        let cmd = CommandDescription::new("cf", ["auth", "myUser"]);
        assert_eq!(
            RedactionRules::default().redact_command(&cmd),
            "cf auth myUser"
        );
    }

    #[test]
    fn unrelated_commands_are_untouched() {
        let cmd = CommandDescription::new("bash", ["-c", "echo auth"]);
        assert_eq!(
            RedactionRules::default().redact_command(&cmd),
            "bash -c echo auth"
        );
    }

    #[test]
    fn literal_secrets_are_replaced_inside_arguments() {
        let rules = RedactionRules::none().with_secret("s3cr3t");
        let cmd = CommandDescription::new("curl", ["-H", "Authorization: bearer s3cr3t"]);
        assert_eq!(
            rules.redact_command(&cmd),
            "curl -H Authorization: bearer [REDACTED]"
        );
    }

    #[test]
    fn empty_secret_is_ignored() {
        let rules = RedactionRules::none().with_secret("");
        assert!(rules.is_empty());
        assert_eq!(rules.redact_text("abc"), "abc");
    }

    #[test]
    fn redacted_description_keeps_shape() {
        let cmd = CommandDescription::new("cf", ["auth", "myUser", "pw"]);
        let redacted = RedactionRules::default().redact_description(&cmd);
        assert_eq!(redacted.executable(), "cf");
        assert_eq!(redacted.args(), ["auth", "myUser", REDACTED]);
    }

    #[test]
    fn password_equal_to_user_is_hidden_everywhere() {
        let cmd = CommandDescription::new("cf", ["auth", "pw", "pw"]);
        let line = RedactionRules::default().redact_command(&cmd);
        assert_eq!(line, "cf auth [REDACTED] [REDACTED]");
    }

    #[test]
    fn password_inside_other_arguments_is_hidden() {
        let cmd = CommandDescription::new("cf", ["auth", "admin", "adm"]);
        let line = RedactionRules::default().redact_command(&cmd);
        assert_eq!(line, "cf auth [REDACTED]in [REDACTED]");
        assert!(!line.contains("adm"));
    }

    #[test]
    fn positional_value_does_not_become_a_lasting_secret() {
        let rules = RedactionRules::default();
        rules.redact_command(&CommandDescription::new("cf", ["auth", "u", "pw"]));
        assert_eq!(rules.redact_text("pw"), "pw");
    }

    #[test]
    fn none_logs_verbatim() {
        let cmd = CommandDescription::new("cf", ["auth", "u", "p"]);
        assert_eq!(RedactionRules::none().redact_command(&cmd), "cf auth u p");
    }
}
