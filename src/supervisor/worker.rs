//! Worker side of the supervisor.
//!
//! A worker is a separate OS process: the controller re-executes its own
//! binary with the hidden `__worker` sub-command, the worker's channel write
//! end installed as stdout, and stderr inherited for events.
//!
//! # Behavior
//!
//! - Marker input: close the channel empty, idle until interrupted (SIGINT
//!   keeps its default disposition and terminates the process) or until
//!   `marker_timeout` elapses, then exit 0.
//! - Any other input: open it as a file. On failure exit
//!   [`EXIT_INPUT_UNREADABLE`] with nothing written. On success write one
//!   histogram frame, close the channel, sleep `delay_for(index)`, exit 0.
//!
//! Exit statuses are the only failure path back to the controller; the
//! channel carries results, never errors.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::channel::WriteEnd;
use crate::error::ConfigError;
use crate::events::{stderr_sink, EventFormat, EventSink, SupervisorEvent};
use crate::histogram::Histogram;
use crate::wire;

use super::config::WorkerTiming;

/// Worker finished normally.
pub const EXIT_SUCCESS: i32 = 0;
/// The input could not be opened or read.
pub const EXIT_INPUT_UNREADABLE: i32 = 1;
/// Writing the histogram to the channel failed.
pub const EXIT_CHANNEL_FAILED: i32 = 2;
/// The `__worker` arguments were malformed.
pub const EXIT_BAD_INVOCATION: i32 = 3;

/// Hidden sub-command that selects worker mode.
pub const WORKER_SUBCOMMAND: &str = "__worker";

/// What a worker does with its input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerTask<'a> {
    /// Count letters in the file at this path.
    Histogram(&'a Path),
    /// Produce nothing; wait to be interrupted.
    AwaitInterrupt,
}

impl<'a> WorkerTask<'a> {
    /// The marker selects [`WorkerTask::AwaitInterrupt`]; anything else is a path.
    pub fn classify(input: &'a OsStr, marker: &str) -> Self {
        if input == OsStr::new(marker) {
            Self::AwaitInterrupt
        } else {
            Self::Histogram(Path::new(input))
        }
    }
}

/// Everything a worker process needs, passed on its command line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerInvocation {
    pub index: usize,
    pub input: OsString,
    pub marker: String,
    pub timing: WorkerTiming,
    pub event_format: EventFormat,
}

impl WorkerInvocation {
    /// Command-line arguments (after the program name) for this invocation.
    pub fn to_args(&self) -> Vec<OsString> {
        vec![
            WORKER_SUBCOMMAND.into(),
            format!("--index={}", self.index).into(),
            format!("--base-delay-ms={}", self.timing.base_delay.as_millis()).into(),
            format!("--stagger-ms={}", self.timing.stagger.as_millis()).into(),
            format!(
                "--marker-timeout-ms={}",
                self.timing.marker_timeout.as_millis()
            )
            .into(),
            format!("--marker={}", self.marker).into(),
            format!("--event-format={}", self.event_format.as_str()).into(),
            "--".into(),
            self.input.clone(),
        ]
    }

    /// Parses the arguments that follow [`WORKER_SUBCOMMAND`].
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut index = None;
        let mut marker = None;
        let mut timing = WorkerTiming::immediate();
        let mut event_format = EventFormat::default();
        let mut input = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let flag = arg.to_string_lossy();
            if flag == "--" {
                input = args.next();
                if let Some(extra) = args.next() {
                    return Err(ConfigError::UnknownFlag(extra.to_string_lossy().into_owned()));
                }
                break;
            }
            if let Some(v) = flag.strip_prefix("--index=") {
                index = Some(parse_num(v, "--index")?);
            } else if let Some(v) = flag.strip_prefix("--base-delay-ms=") {
                timing.base_delay = Duration::from_millis(parse_num(v, "--base-delay-ms")?);
            } else if let Some(v) = flag.strip_prefix("--stagger-ms=") {
                timing.stagger = Duration::from_millis(parse_num(v, "--stagger-ms")?);
            } else if let Some(v) = flag.strip_prefix("--marker-timeout-ms=") {
                timing.marker_timeout =
                    Duration::from_millis(parse_num(v, "--marker-timeout-ms")?);
            } else if let Some(v) = flag.strip_prefix("--marker=") {
                marker = Some(v.to_string());
            } else if let Some(v) = flag.strip_prefix("--event-format=") {
                event_format = EventFormat::parse(v).ok_or_else(|| ConfigError::InvalidValue {
                    flag: "--event-format",
                    value: v.to_string(),
                })?;
            } else {
                return Err(ConfigError::UnknownFlag(flag.to_string()));
            }
        }

        let index = index.ok_or(ConfigError::InvalidValue {
            flag: "--index",
            value: String::new(),
        })?;
        let marker = match marker {
            Some(m) if !m.is_empty() => m,
            _ => return Err(ConfigError::EmptyMarker),
        };
        let input = input.ok_or(ConfigError::NoInputs)?;
        Ok(Self {
            index,
            input,
            marker,
            timing,
            event_format,
        })
    }
}

fn parse_num<T: std::str::FromStr>(value: &str, flag: &'static str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag,
        value: value.to_string(),
    })
}

/// Entry point of a worker process. Returns the process exit status.
pub fn worker_main(invocation: &WorkerInvocation) -> i32 {
    let sink = stderr_sink(invocation.event_format);
    let channel = WriteEnd::from_stdout().into_file();
    let code = run_worker(invocation, channel, &*sink);
    sink.flush();
    code
}

/// Runs one worker against `channel`, reporting progress to `sink`.
///
/// `channel` is consumed and dropped before any delay, so the controller
/// sees the write end closed as soon as the result is out.
pub fn run_worker<W: Write>(invocation: &WorkerInvocation, channel: W, sink: &dyn EventSink) -> i32 {
    let pid = std::process::id();
    let index = invocation.index;
    let input = invocation.input.as_bytes();
    let stage = |stage: &'static str| {
        sink.emit(SupervisorEvent::WorkerStage {
            index,
            pid,
            stage,
            input,
        })
    };

    match WorkerTask::classify(&invocation.input, &invocation.marker) {
        WorkerTask::AwaitInterrupt => {
            drop(channel);
            stage("awaiting-interrupt");
            thread::sleep(invocation.timing.marker_timeout);
            stage("timeout");
            EXIT_SUCCESS
        }
        WorkerTask::Histogram(path) => {
            stage("opening");
            let data = match read_input(path) {
                Ok(data) => data,
                Err(err) => {
                    drop(channel);
                    let message = format!("cannot read {}: {err}", path.display());
                    sink.emit(SupervisorEvent::Diagnostic {
                        level: "error",
                        pid: Some(pid),
                        message: &message,
                    });
                    return EXIT_INPUT_UNREADABLE;
                }
            };

            let frame = wire::encode(&Histogram::from_bytes(&data));
            drop(data);
            if let Err(code) = send_frame(channel, &frame, pid, sink) {
                return code;
            }
            stage("sent");

            let delay = invocation.timing.delay_for(index);
            let message = format!("sleeping for {} ms", delay.as_millis());
            sink.emit(SupervisorEvent::Diagnostic {
                level: "info",
                pid: Some(pid),
                message: &message,
            });
            thread::sleep(delay);
            stage("done");
            EXIT_SUCCESS
        }
    }
}

fn read_input(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

fn send_frame<W: Write>(
    mut channel: W,
    frame: &[u8],
    pid: u32,
    sink: &dyn EventSink,
) -> Result<(), i32> {
    if let Err(err) = channel.write_all(frame).and_then(|()| channel.flush()) {
        let message = format!("writing histogram to channel failed: {err}");
        sink.emit(SupervisorEvent::Diagnostic {
            level: "error",
            pid: Some(pid),
            message: &message,
        });
        return Err(EXIT_CHANNEL_FAILED);
    }
    Ok(())
}
