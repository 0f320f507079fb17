//! Worker registry shared by the spawn loop and the reaper.
//!
//! # Ownership
//!
//! One [`Registry`] per run, behind `Arc<Mutex<_>>`. The spawn loop inserts a
//! [`WorkerRecord`] (holding the channel read end) right after spawning; the
//! reaper removes it when the matching exit notice arrives and drops the read
//! end once drained.
//!
//! # Ordering
//!
//! A record is inserted before the exit watcher for that worker is started,
//! and only watchers publish exit notices. So every notice the reaper sees
//! refers to a pid whose record already exists (or existed); a miss means an
//! internal inconsistency, never a race with the spawn loop.
//!
//! # Counter invariant
//!
//! `reaped <= workers` at every observation point. The controller finishes
//! exactly when the two are equal.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::channel::ReadEnd;
use crate::error::SupervisorError;

use super::artifact::ArtifactRecord;

/// Controller-side bookkeeping for one spawned worker.
#[derive(Debug)]
pub struct WorkerRecord {
    /// 0-based position in the input list.
    pub index: usize,
    /// Runtime-assigned process identity; immutable after spawn.
    pub pid: u32,
    /// The argument the worker was started with.
    pub input: OsString,
    read_end: ReadEnd,
}

impl WorkerRecord {
    pub fn new(index: usize, pid: u32, input: OsString, read_end: ReadEnd) -> Self {
        Self {
            index,
            pid,
            input,
            read_end,
        }
    }

    /// Gives up the read end for draining; the record is consumed.
    pub fn into_read_end(self) -> ReadEnd {
        self.read_end
    }
}

/// Spawn/reap counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerminationCounters {
    workers: u64,
    reaped: u64,
}

impl TerminationCounters {
    #[inline]
    pub fn workers(&self) -> u64 {
        self.workers
    }

    #[inline]
    pub fn reaped(&self) -> u64 {
        self.reaped
    }

    /// True once every spawned worker has been reaped.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.reaped == self.workers
    }

    #[inline]
    pub fn record_spawn(&mut self) {
        self.workers += 1;
    }

    /// Counts one reap. Returns `false` (and counts nothing) if that would
    /// push `reaped` past `workers`.
    #[inline]
    pub fn record_reaped(&mut self) -> bool {
        if self.reaped >= self.workers {
            return false;
        }
        self.reaped += 1;
        true
    }
}

/// Outcome tallies accumulated by the reaper.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Artifacts written, in reap order.
    pub artifacts: Vec<ArtifactRecord>,
    /// Workers that exited non-zero (typically unreadable input).
    pub input_failures: u64,
    /// Marker workers stopped by the controller's interrupt.
    pub interrupted: u64,
    /// Workers terminated by any other signal, or whose exit could not be
    /// observed.
    pub abnormal: u64,
    /// Exit notices with no matching record.
    pub missing_records: u64,
    /// Channels that held something other than zero bytes or one frame.
    pub malformed_payloads: u64,
}

/// Records, counters, tallies and the fatal-error slot for one run.
#[derive(Debug, Default)]
pub struct Registry {
    records: BTreeMap<u32, WorkerRecord>,
    counters: TerminationCounters,
    tally: RunTally,
    fatal: Option<SupervisorError>,
}

/// Shared handle used by the controller and the reaper thread.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Locks the shared registry.
///
/// # Panics
///
/// Panics if a previous holder panicked (fail-fast, like the event sinks).
pub fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().expect("worker registry mutex poisoned")
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Registers a freshly spawned worker and counts the spawn.
    pub fn insert(&mut self, record: WorkerRecord) {
        debug_assert!(
            !self.records.contains_key(&record.pid),
            "pid {} registered twice",
            record.pid
        );
        self.records.insert(record.pid, record);
        self.counters.record_spawn();
    }

    /// Counts one reap event and removes the record for `pid`, if any.
    ///
    /// The reap is counted even when no record matches.
    pub fn reap(&mut self, pid: u32) -> Option<WorkerRecord> {
        let counted = self.counters.record_reaped();
        debug_assert!(counted, "reaped more workers than were spawned");
        self.records.remove(&pid)
    }

    #[cfg(test)]
    fn index_of(&self, pid: u32) -> Option<usize> {
        self.records.get(&pid).map(|r| r.index)
    }

    #[inline]
    pub fn counters(&self) -> TerminationCounters {
        self.counters
    }

    /// Number of records not yet reaped.
    #[inline]
    pub fn live(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn tally(&self) -> &RunTally {
        &self.tally
    }

    #[inline]
    pub fn tally_mut(&mut self) -> &mut RunTally {
        &mut self.tally
    }

    /// Stores a fatal error. The first one wins.
    pub fn set_fatal(&mut self, err: SupervisorError) {
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
    }

    #[inline]
    pub fn has_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn take_fatal(&mut self) -> Option<SupervisorError> {
        self.fatal.take()
    }

    /// Moves the accumulated tallies out.
    pub fn take_tally(&mut self) -> RunTally {
        std::mem::take(&mut self.tally)
    }
}
