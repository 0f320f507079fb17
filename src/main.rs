//! Letter-histogram supervisor CLI.
//!
//! Spawns one worker process per input file and writes a `file<pid>.hist`
//! artifact for every worker that read its input successfully. A `SIG`
//! argument starts a worker that is interrupted immediately.
//!
//! # Output
//!
//! Progress and diagnostics go to stderr as events (`--event-format`).
//! Statistics are written to stderr upon completion:
//! `workers=N reaped=N artifacts=N input_failures=N interrupted=N abnormal=N elapsed_ms=N`
//!
//! # Exit Codes
//!
//! - `0`: every worker was reaped (worker failures do not count)
//! - `1`: invalid arguments, no inputs, too many inputs, or a fatal
//!   controller error
//!
//! Worker processes (hidden `__worker` sub-command) use the worker exit
//! statuses from `supervisor::worker`.

use std::ffi::{OsStr, OsString};
use std::process::ExitCode;

use histo_supervisor::cli::{self, Invocation};
use histo_supervisor::events::stderr_sink;
use histo_supervisor::supervisor::{self, worker_main, EXIT_BAD_INVOCATION, WORKER_SUBCOMMAND};

fn main() -> ExitCode {
    let exe = std::env::args_os()
        .next()
        .unwrap_or_else(|| OsString::from("histo-supervisor"));

    let invocation = match cli::parse_args() {
        Ok(inv) => inv,
        Err(err) => {
            eprintln!("error: {err}");
            if std::env::args_os().nth(1).as_deref() == Some(OsStr::new(WORKER_SUBCOMMAND)) {
                return ExitCode::from(EXIT_BAD_INVOCATION as u8);
            }
            eprintln!();
            cli::print_usage(&exe);
            return ExitCode::from(1);
        }
    };

    match invocation {
        Invocation::Help => {
            cli::print_usage(&exe);
            ExitCode::SUCCESS
        }
        Invocation::Worker(inv) => ExitCode::from(worker_main(&inv) as u8),
        Invocation::Supervise { config, inputs } => {
            if let Err(err) = config.validate(inputs.len()) {
                eprintln!("error: {err}");
                eprintln!();
                cli::print_usage(&exe);
                return ExitCode::from(1);
            }
            let sink = stderr_sink(config.event_format);
            match supervisor::supervise(&config, &inputs, sink) {
                Ok(report) => {
                    eprintln!(
                        "workers={} reaped={} artifacts={} input_failures={} interrupted={} abnormal={} elapsed_ms={}",
                        report.workers,
                        report.reaped,
                        report.artifacts.len(),
                        report.input_failures,
                        report.interrupted,
                        report.abnormal,
                        report.elapsed.as_millis()
                    );
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    ExitCode::from(err.exit_code())
                }
            }
        }
    }
}
