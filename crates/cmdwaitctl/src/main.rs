//! cmdwaitctl - run a command and wait on it with retries
//!
//! Thin front end over the cmdwait library: loads `.cmdwait/config`, applies
//! flag overrides, starts the command, and exits non-zero when the wait fails.

mod render;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use clap::{Args, Parser, Subcommand};
use cmdwait::helpers::{cli_auth, curl};
use cmdwait::{CmdWaiter, CommandReporter, CommandStarter, HarnessError, ProcessHandle, Starter};
use cmdwait_core::{Config, WaitSpec};
use eyre::WrapErr;
use render::JsonReport;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Start a command and wait for it to match an exit code and output.
#[derive(Parser)]
#[command(name = "cmdwaitctl")]
#[command(about = "Run external commands with deadlines, retries, and redacted reporting")]
#[command(version)]
struct Cli {
    /// Config file path (overrides .cmdwait/config)
    #[arg(long, global = true, env = "CMDWAIT_CONFIG")]
    config: Option<PathBuf>,

    /// Disable colour in command report lines
    #[arg(long, global = true, env = "CMDWAIT_NO_COLOR")]
    no_color: bool,

    /// Print a JSON wait report on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct WaitArgs {
    /// Per-attempt deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Maximum number of spawns
    #[arg(long)]
    attempts: Option<u32>,

    /// Exit code that counts as success
    #[arg(long, allow_negative_numbers = true)]
    exit_code: Option<i32>,

    /// Substring the combined output must contain
    #[arg(long)]
    expect_output: Option<String>,
}

impl WaitArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(attempts) = self.attempts {
            config.attempts = attempts;
        }
        if let Some(exit_code) = self.exit_code {
            config.exit_code = exit_code;
        }
        if let Some(ref expect_output) = self.expect_output {
            config.expect_output.clone_from(expect_output);
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run an executable with arguments passed verbatim
    Run {
        #[command(flatten)]
        wait: WaitArgs,

        /// Executable to start (resolved on PATH)
        executable: String,

        /// Arguments, passed without shell interpretation
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run curl with the standard quiet flags
    Curl {
        #[command(flatten)]
        wait: WaitArgs,

        /// Skip TLS certificate validation
        #[arg(long)]
        insecure: bool,

        /// Literal value to hide from the report line (repeatable)
        #[arg(long)]
        redact: Vec<String>,

        /// Arguments appended after the standard flags
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Authenticate with the platform CLI, password redacted
    Auth {
        #[command(flatten)]
        wait: WaitArgs,

        /// CLI binary (overrides cli_bin from config)
        #[arg(long)]
        cli: Option<String>,

        /// User name
        user: String,

        /// Password
        #[arg(long, env = "CMDWAIT_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Report lines go to stderr too, so keep logs there and stdout clean.
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether the wait succeeded.
async fn run(cli: Cli) -> eyre::Result<bool> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.no_color {
        config.no_color = true;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, cancelling wait");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Run {
            wait,
            executable,
            args,
        } => {
            wait.apply(&mut config);
            let spec = wait_spec(&config)?;
            let starter = build_starter(&config);
            let first = starter.start(&executable, args)?;
            wait_on(starter, first, spec, cancel, cli.json).await
        }
        Command::Curl {
            wait,
            insecure,
            redact,
            args,
        } => {
            wait.apply(&mut config);
            config.redact_secrets.extend(redact);
            let skip_ssl = insecure || config.skip_ssl_validation;
            let spec = wait_spec(&config)?;
            // Secrets live on the starter so retries are redacted as well.
            let starter = build_starter(&config);
            let first = curl(&starter, skip_ssl, args)?;
            wait_on(starter, first, spec, cancel, cli.json).await
        }
        Command::Auth {
            wait,
            cli: cli_bin,
            user,
            password,
        } => {
            wait.apply(&mut config);
            if let Some(cli_bin) = cli_bin {
                config.cli_bin = cli_bin;
            }
            let spec = wait_spec(&config)?;
            let starter = build_starter(&config);
            let first = cli_auth(&starter, &config.cli_bin, &user, &password)?;
            wait_on(starter, first, spec, cancel, cli.json).await
        }
    }
}

/// Defaults, then `.cmdwait/config` in the working directory, then `--config`.
fn load_config(explicit: Option<&Path>) -> eyre::Result<Config> {
    let mut config = Config::default();

    let cwd = std::env::current_dir().wrap_err("failed to read current directory")?;
    let local = Config::default_path(&cwd);
    if local.exists() {
        config
            .load_file(&local)
            .wrap_err_with(|| format!("failed to load {}", local.display()))?;
        debug!(path = %local.display(), "loaded workspace config");
    }

    if let Some(path) = explicit {
        config
            .load_file(path)
            .wrap_err_with(|| format!("failed to load {}", path.display()))?;
        debug!(path = %path.display(), "loaded config");
    }

    Ok(config)
}

/// Validated before anything is spawned.
fn wait_spec(config: &Config) -> eyre::Result<WaitSpec> {
    config.wait_spec().wrap_err("invalid wait settings")
}

fn build_starter(config: &Config) -> CommandStarter {
    let reporter = CommandReporter::new().with_color(!config.no_color);
    CommandStarter::with_reporter(Arc::new(reporter)).with_rules(config.redaction_rules())
}

async fn wait_on(
    starter: CommandStarter,
    first: ProcessHandle,
    spec: WaitSpec,
    cancel: CancellationToken,
    json: bool,
) -> eyre::Result<bool> {
    let waiter = CmdWaiter::new(Arc::new(starter), spec.clone()).with_cancellation(cancel);
    match waiter.run(first).await {
        Ok(report) => {
            if json {
                render::print_json(&JsonReport::success(&report, &spec))?;
            } else {
                render::print_success(&report)?;
            }
            Ok(true)
        }
        Err(HarnessError::Wait(failure)) => {
            if json {
                render::print_json(&JsonReport::failure(&failure, &spec))?;
            } else {
                render::print_failure(&failure);
            }
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
