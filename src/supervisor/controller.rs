//! Controller: spawn workers, interrupt marker workers, wait for the reaper.
//!
//! Startup is strictly ordered per worker:
//!
//! 1. create the channel
//! 2. spawn the worker with the write end as its stdout
//! 3. drop the controller's copy of the write end
//! 4. insert the record into the registry
//! 5. start the exit watcher
//!
//! Step 4 before step 5 guarantees the reaper finds a record for every pid it
//! is notified about. The controller then polls the registry counters until
//! every spawned worker has been reaped, or the reaper records a fatal error.

use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::channel;
use crate::error::SupervisorError;
use crate::events::{EventSink, SummaryEvent, SupervisorEvent};

use super::artifact::ArtifactRecord;
use super::config::SupervisorConfig;
use super::reaper::{notice_stream, watch_exit, ExitNotice, Reaper};
use super::registry::{lock, Registry, SharedRegistry, WorkerRecord};
use super::worker::{WorkerInvocation, WorkerTask};

/// Outcome of a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuperviseReport {
    /// Workers spawned.
    pub workers: u64,
    /// Workers reaped. Equals `workers` on success.
    pub reaped: u64,
    /// Artifacts written, in reap order.
    pub artifacts: Vec<ArtifactRecord>,
    pub input_failures: u64,
    pub interrupted: u64,
    pub abnormal: u64,
    pub missing_records: u64,
    pub malformed_payloads: u64,
    pub elapsed: Duration,
}

impl SuperviseReport {
    /// Summary event for this report.
    pub fn summary(&self) -> SummaryEvent {
        SummaryEvent {
            workers: self.workers,
            reaped: self.reaped,
            artifacts: self.artifacts.len() as u64,
            input_failures: self.input_failures,
            interrupted: self.interrupted,
            abnormal: self.abnormal,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

/// Runs one worker per input and blocks until all of them are reaped.
///
/// # Errors
///
/// Configuration errors are returned before anything is spawned. Channel,
/// spawn and watcher failures abort the spawn loop; artifact failures stop
/// the reaper. In both cases workers already started keep running and are
/// left to finish on their own.
pub fn supervise(
    config: &SupervisorConfig,
    inputs: &[OsString],
    sink: Arc<dyn EventSink>,
) -> Result<SuperviseReport, SupervisorError> {
    config.validate(inputs.len())?;
    let program = match &config.worker_program {
        Some(path) => path.clone(),
        None => std::env::current_exe().map_err(SupervisorError::WorkerProgram)?,
    };

    let started = Instant::now();
    sink.emit(SupervisorEvent::Starting {
        inputs: inputs.len(),
    });

    let registry = Registry::shared();
    let (tx, rx) = notice_stream();
    let reaper = Reaper::new(
        Arc::clone(&registry),
        rx,
        config.out_dir.clone(),
        OsString::from(&config.marker),
        Arc::clone(&sink),
    )
    .spawn()
    .map_err(SupervisorError::ReaperStart)?;

    let mut run = Run {
        config,
        program,
        registry: &registry,
        notices: tx,
        sink: &*sink,
        watchers: Vec::with_capacity(inputs.len()),
    };
    let spawned = inputs
        .iter()
        .enumerate()
        .try_for_each(|(index, input)| run.start_worker(index, input));

    if let Err(err) = spawned {
        // Workers already running, their watchers and the reaper are left
        // detached.
        return Err(err);
    }

    let result = run.wait_for_completion();
    let watchers = std::mem::take(&mut run.watchers);
    drop(run);
    // Every watcher has published (or the run is fatal), so the reaper's
    // receiver disconnects once it has handled the last notice.
    let _ = reaper.join();
    result?;
    for watcher in watchers {
        let _ = watcher.join();
    }

    let mut reg = lock(&registry);
    // The last reap is counted before its artifact is written, so the poll
    // loop can see completion before the reaper parks a fatal error.
    if let Some(err) = reg.take_fatal() {
        return Err(err);
    }
    let counters = reg.counters();
    let tally = reg.take_tally();
    drop(reg);

    let report = SuperviseReport {
        workers: counters.workers(),
        reaped: counters.reaped(),
        artifacts: tally.artifacts,
        input_failures: tally.input_failures,
        interrupted: tally.interrupted,
        abnormal: tally.abnormal,
        missing_records: tally.missing_records,
        malformed_payloads: tally.malformed_payloads,
        elapsed: started.elapsed(),
    };
    sink.emit(SupervisorEvent::Summary(report.summary()));
    sink.flush();
    Ok(report)
}

struct Run<'a> {
    config: &'a SupervisorConfig,
    program: PathBuf,
    registry: &'a SharedRegistry,
    notices: Sender<ExitNotice>,
    sink: &'a dyn EventSink,
    watchers: Vec<JoinHandle<()>>,
}

impl Run<'_> {
    fn start_worker(&mut self, index: usize, input: &OsString) -> Result<(), SupervisorError> {
        let (read_end, write_end) =
            channel::create().map_err(|source| SupervisorError::ChannelCreate { index, source })?;

        let invocation = WorkerInvocation {
            index,
            input: input.clone(),
            marker: self.config.marker.clone(),
            timing: self.config.timing,
            event_format: self.config.event_format,
        };
        // The Command holds the write end; dropping it after spawn closes the
        // controller's copy so the worker's exit is the channel's EOF.
        let mut command = Command::new(&self.program);
        command
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(write_end.into_stdio())
            .stderr(Stdio::inherit());
        // SAFETY: signal(2) is async-signal-safe. An inherited SIG_IGN would
        // make marker workers immune to the interrupt.
        unsafe {
            command.pre_exec(|| {
                if libc::signal(libc::SIGINT, libc::SIG_DFL) == libc::SIG_ERR {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }
        let spawned = command.spawn();
        drop(command);
        let child = spawned.map_err(|source| SupervisorError::Spawn { index, source })?;
        let pid = child.id();

        self.sink.emit(SupervisorEvent::WorkerSpawned {
            index,
            pid,
            input: input.as_bytes(),
        });
        lock(self.registry).insert(WorkerRecord::new(index, pid, input.clone(), read_end));

        // Interrupt before the watcher exists: until then nothing can wait
        // on the child, so its pid cannot be recycled under us.
        if matches!(
            WorkerTask::classify(input, &self.config.marker),
            WorkerTask::AwaitInterrupt
        ) {
            match interrupt(pid, libc::SIGINT) {
                Ok(()) => self.sink.emit(SupervisorEvent::InterruptSent { index, pid }),
                Err(err) => {
                    let message = format!("interrupt failed: {err}");
                    self.sink.emit(SupervisorEvent::Diagnostic {
                        level: "warn",
                        pid: Some(pid),
                        message: &message,
                    });
                }
            }
        }

        let watcher = match watch_exit(child, self.notices.clone()) {
            Ok(handle) => handle,
            Err(source) => {
                // Without a watcher the exit would never be counted.
                let _ = interrupt(pid, libc::SIGKILL);
                return Err(SupervisorError::WatcherStart { index, source });
            }
        };
        self.watchers.push(watcher);
        Ok(())
    }

    /// Polls until every spawned worker is reaped or a fatal error appears.
    fn wait_for_completion(&mut self) -> Result<(), SupervisorError> {
        loop {
            {
                let mut reg = lock(self.registry);
                if let Some(err) = reg.take_fatal() {
                    return Err(err);
                }
                if reg.counters().is_complete() {
                    return Ok(());
                }
            }
            thread::sleep(self.config.poll_interval);
        }
    }
}

fn interrupt(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions. Callers pass the pid
    // of a child that has not been waited for yet.
    let rc = unsafe { libc::kill(pid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
