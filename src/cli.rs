//! Command-line parser for the supervisor binary.
//!
//! Hand-rolled (no clap dependency), `--name=value` flags only.
//!
//! # Grammar
//!
//! ```text
//! histo-supervisor [OPTIONS] [--] <file|SIG>...
//! histo-supervisor --help | -h
//! histo-supervisor __worker --index=<n> ... -- <input>   (internal)
//! ```
//!
//! Parsing never exits the process; `main` decides what to print and which
//! status to return.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::events::EventFormat;
use crate::supervisor::{SupervisorConfig, WorkerInvocation, MAX_WORKERS, WORKER_SUBCOMMAND};

/// What the process was asked to do.
#[derive(Debug)]
pub enum Invocation {
    Help,
    /// Internal: run as a worker for the controller that spawned us.
    Worker(WorkerInvocation),
    Supervise {
        config: SupervisorConfig,
        inputs: Vec<OsString>,
    },
}

/// Parses `std::env::args_os()` minus the program name.
pub fn parse_args() -> Result<Invocation, ConfigError> {
    parse_args_from(std::env::args_os().skip(1))
}

/// Parses the arguments that follow the program name.
///
/// Input count limits are not checked here; see
/// [`SupervisorConfig::validate`].
pub fn parse_args_from<I>(args: I) -> Result<Invocation, ConfigError>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter().peekable();
    if args.peek().map(OsString::as_os_str) == Some(OsStr::new(WORKER_SUBCOMMAND)) {
        args.next();
        return WorkerInvocation::parse(args).map(Invocation::Worker);
    }

    let mut config = SupervisorConfig::default();
    let mut inputs = Vec::new();
    let mut options_done = false;

    for arg in args {
        if options_done {
            inputs.push(arg);
            continue;
        }
        let Some(flag) = arg.to_str() else {
            inputs.push(arg);
            continue;
        };
        match flag {
            "--" => {
                options_done = true;
                continue;
            }
            "--help" | "-h" => return Ok(Invocation::Help),
            _ => {}
        }
        if !flag.starts_with("--") {
            inputs.push(arg);
            continue;
        }

        if let Some(rest) = flag.strip_prefix("--out-dir=") {
            if rest.is_empty() {
                return Err(invalid("--out-dir", rest));
            }
            config.out_dir = PathBuf::from(rest);
        } else if let Some(rest) = flag.strip_prefix("--base-delay-ms=") {
            config.timing.base_delay = parse_ms(rest, "--base-delay-ms")?;
        } else if let Some(rest) = flag.strip_prefix("--stagger-ms=") {
            config.timing.stagger = parse_ms(rest, "--stagger-ms")?;
        } else if let Some(rest) = flag.strip_prefix("--marker-timeout-ms=") {
            config.timing.marker_timeout = parse_ms(rest, "--marker-timeout-ms")?;
        } else if let Some(rest) = flag.strip_prefix("--poll-ms=") {
            let poll = parse_ms(rest, "--poll-ms")?;
            if poll.is_zero() {
                return Err(invalid("--poll-ms", rest));
            }
            config.poll_interval = poll;
        } else if let Some(rest) = flag.strip_prefix("--event-format=") {
            config.event_format =
                EventFormat::parse(rest).ok_or_else(|| invalid("--event-format", rest))?;
        } else {
            return Err(ConfigError::UnknownFlag(flag.to_string()));
        }
    }

    Ok(Invocation::Supervise { config, inputs })
}

fn parse_ms(value: &str, flag: &'static str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| invalid(flag, value))
}

fn invalid(flag: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        flag,
        value: value.to_string(),
    }
}

/// Prints usage to stderr.
pub fn print_usage(exe: &OsStr) {
    eprintln!(
        "usage: {} [OPTIONS] [--] <file|SIG>...

Counts letters in each file in its own worker process and writes one
file<pid>.hist per readable input. A SIG argument starts a worker that is
interrupted right away. At most {MAX_WORKERS} inputs.

OPTIONS:
    --out-dir=<DIR>             Artifact directory (default: .)
    --base-delay-ms=<N>         Worker delay after sending its result (default: 10000)
    --stagger-ms=<N>            Extra delay per worker index (default: 3000)
    --marker-timeout-ms=<N>     How long a SIG worker waits (default: 10000)
    --poll-ms=<N>               Controller poll interval (default: 1000)
    --event-format=<FMT>        Diagnostics on stderr: text|jsonl (default: text)
    --help, -h                  Show this help message",
        exe.to_string_lossy()
    );
}
