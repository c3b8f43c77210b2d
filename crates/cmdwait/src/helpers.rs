//! Convenience entry points for common commands.

use crate::error::Result;
use crate::handle::ProcessHandle;
use crate::starter::{CommandStarter, Starter};
use cmdwait_core::PositionalRule;

/// Start `executable args` with a default starter.
pub fn run<I, S>(executable: &str, args: I) -> Result<ProcessHandle>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandStarter::new().start(executable, args)
}

/// Full curl argument list: quiet, no `Expect: 100-continue`, errors still shown.
pub fn curl_args<I, S>(skip_ssl_validation: bool, args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = Vec::new();
    if skip_ssl_validation {
        out.push("--insecure".to_string());
    }
    out.extend(
        ["--header", "Expect:", "--show-error", "--silent"]
            .into_iter()
            .map(String::from),
    );
    out.extend(args.into_iter().map(Into::into));
    out
}

pub fn curl<I, S>(starter: &CommandStarter, skip_ssl_validation: bool, args: I) -> Result<ProcessHandle>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    starter.start("curl", curl_args(skip_ssl_validation, args))
}

/// Like [`curl`], but `secret` is hidden wherever it appears in the reported line.
pub fn curl_redact<I, S>(
    starter: &CommandStarter,
    secret: &str,
    skip_ssl_validation: bool,
    args: I,
) -> Result<ProcessHandle>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    starter
        .clone()
        .with_secret(secret)
        .start("curl", curl_args(skip_ssl_validation, args))
}

/// Start `<cli> auth <user> <password>` with the password redacted.
pub fn cli_auth(
    starter: &CommandStarter,
    cli: &str,
    user: &str,
    password: &str,
) -> Result<ProcessHandle> {
    starter
        .clone()
        .with_positional(PositionalRule::new("auth", 2))
        .start(cli, ["auth", user, password])
}
