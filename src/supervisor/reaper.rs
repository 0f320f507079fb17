//! Completion reaper: turns worker exits into artifacts.
//!
//! # Architecture
//!
//! ```text
//!  Worker(i) ──exit──► exit watcher(i) ──ExitNotice──┐
//!  Worker(j) ──exit──► exit watcher(j) ──ExitNotice──┤  (crossbeam, unbounded)
//!                                                    ▼
//!                                  Reaper thread: recv() one notice,
//!                                  then try_recv() until empty
//!                                                    │
//!                       Registry (lock) ◄────────────┤ count reap, take record
//!                                                    ▼
//!                        drain read end → decode frame → file<pid>.hist
//! ```
//!
//! The first notice of a batch is the notification; the reaper never assumes
//! one exit per wakeup and drains whatever else is already queued before
//! blocking again.
//!
//! # Correctness Invariants
//!
//! - Every notice increments `reaped` exactly once, matched record or not.
//! - Every matched record's read end is released, whatever the outcome.
//! - Only a normal exit with one valid frame produces an artifact.
//! - Artifact failures are fatal: the error is parked in the registry and
//!   the reaper stops.

use std::ffi::OsString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::SupervisorError;
use crate::events::{EventSink, SupervisorEvent};
use crate::wire;

use super::artifact::{write_artifact, ArtifactRecord};
use super::registry::{lock, SharedRegistry, WorkerRecord};

/// How a worker process ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Normal exit with this status code.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(i32),
    /// The exit could not be observed (wait failed or status unrecognized).
    Unknown(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            Self::Exited(code)
        } else if let Some(signal) = status.signal() {
            Self::Signaled(signal)
        } else {
            Self::Unknown(status.to_string())
        }
    }
}

/// One worker exit, published by that worker's exit watcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExitNotice {
    pub pid: u32,
    pub outcome: ExitOutcome,
}

/// Creates the aggregated exit-notice stream.
pub fn notice_stream() -> (Sender<ExitNotice>, Receiver<ExitNotice>) {
    crossbeam_channel::unbounded()
}

/// Starts a thread that waits for `child` and publishes its exit.
///
/// Must be called only after the worker's record is in the registry.
pub fn watch_exit(mut child: Child, notices: Sender<ExitNotice>) -> io::Result<JoinHandle<()>> {
    let pid = child.id();
    thread::Builder::new()
        .name(format!("exit-watch-{pid}"))
        .spawn(move || {
            let outcome = match child.wait() {
                Ok(status) => ExitOutcome::from_status(status),
                Err(err) => ExitOutcome::Unknown(format!("wait failed: {err}")),
            };
            // The reaper is gone only after a fatal error; nothing to report to.
            let _ = notices.send(ExitNotice { pid, outcome });
        })
}

/// Controller-side completion handler.
pub struct Reaper {
    registry: SharedRegistry,
    notices: Receiver<ExitNotice>,
    out_dir: PathBuf,
    marker: OsString,
    sink: Arc<dyn EventSink>,
}

impl Reaper {
    pub fn new(
        registry: SharedRegistry,
        notices: Receiver<ExitNotice>,
        out_dir: PathBuf,
        marker: OsString,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            notices,
            out_dir,
            marker,
            sink,
        }
    }

    /// Runs [`Reaper::run`] on a dedicated thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("reaper".to_string())
            .spawn(move || self.run())
    }

    /// Handles notifications until every sender is dropped or a fatal error
    /// is recorded.
    pub fn run(self) {
        while let Ok(first) = self.notices.recv() {
            if !self.handle_notification(first) {
                break;
            }
        }
    }

    /// Handles `first` plus every notice already queued, without blocking.
    ///
    /// Returns `false` once a fatal error has been recorded.
    pub fn handle_notification(&self, first: ExitNotice) -> bool {
        let mut drained = 0usize;
        let mut next = Some(first);
        while let Some(notice) = next {
            drained += 1;
            if let Err(err) = self.reap_one(notice) {
                let message = err.to_string();
                self.sink.emit(SupervisorEvent::Diagnostic {
                    level: "fatal",
                    pid: None,
                    message: &message,
                });
                lock(&self.registry).set_fatal(err);
                return false;
            }
            next = match self.notices.try_recv() {
                Ok(notice) => Some(notice),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
            };
        }
        self.sink.emit(SupervisorEvent::ReapBatch { drained });
        true
    }

    fn reap_one(&self, notice: ExitNotice) -> Result<(), SupervisorError> {
        let pid = notice.pid;
        let record = lock(&self.registry).reap(pid);
        let index = record.as_ref().map(|r| r.index);

        match notice.outcome {
            ExitOutcome::Signaled(signal) => {
                self.sink.emit(SupervisorEvent::WorkerSignaled { index, pid, signal });
                let expected = signal == libc::SIGINT
                    && record.as_ref().is_some_and(|r| r.input == self.marker);
                let mut reg = lock(&self.registry);
                if expected {
                    reg.tally_mut().interrupted += 1;
                } else {
                    reg.tally_mut().abnormal += 1;
                }
                // Dropping the record closes its read end unread.
                Ok(())
            }
            ExitOutcome::Unknown(detail) => {
                let message = format!("worker exit not observed: {detail}");
                self.sink.emit(SupervisorEvent::Diagnostic {
                    level: "warn",
                    pid: Some(pid),
                    message: &message,
                });
                lock(&self.registry).tally_mut().abnormal += 1;
                Ok(())
            }
            ExitOutcome::Exited(code) => {
                self.sink.emit(SupervisorEvent::WorkerExited { index, pid, code });
                if code != 0 {
                    lock(&self.registry).tally_mut().input_failures += 1;
                }
                match record {
                    Some(record) => self.collect(record),
                    None => {
                        self.sink.emit(SupervisorEvent::Diagnostic {
                            level: "error",
                            pid: Some(pid),
                            message: "no worker record for reaped process",
                        });
                        lock(&self.registry).tally_mut().missing_records += 1;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Drains the record's channel and persists a histogram if one arrived.
    fn collect(&self, record: WorkerRecord) -> Result<(), SupervisorError> {
        let index = record.index;
        let pid = record.pid;

        let bytes = match record.into_read_end().drain() {
            Ok(bytes) => bytes,
            Err(err) => {
                let message = format!("reading channel failed: {err}");
                self.sink.emit(SupervisorEvent::Diagnostic {
                    level: "warn",
                    pid: Some(pid),
                    message: &message,
                });
                return Ok(());
            }
        };

        let hist = match wire::decode(&bytes) {
            Ok(Some(hist)) => hist,
            Ok(None) => return Ok(()),
            Err(err) => {
                let message = format!("discarding malformed payload: {err}");
                self.sink.emit(SupervisorEvent::Diagnostic {
                    level: "warn",
                    pid: Some(pid),
                    message: &message,
                });
                lock(&self.registry).tally_mut().malformed_payloads += 1;
                return Ok(());
            }
        };

        let path = write_artifact(&self.out_dir, pid, &hist)?;
        self.sink.emit(SupervisorEvent::ArtifactWritten {
            index,
            pid,
            path: path.as_os_str().as_bytes(),
        });
        lock(&self.registry)
            .tally_mut()
            .artifacts
            .push(ArtifactRecord { index, pid, path });
        Ok(())
    }
}
