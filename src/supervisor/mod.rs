//! Process supervision: one worker process per input, one artifact per
//! successful worker.
//!
//! # Components
//!
//! - [`controller`]: validates inputs, spawns workers, interrupts marker
//!   workers and waits until every worker has been reaped.
//! - [`worker`]: the worker side, run by the same binary through the hidden
//!   `__worker` sub-command. Computes a histogram and writes one frame to
//!   its channel.
//! - [`reaper`]: exit watchers feeding a single reaper thread that drains
//!   channels and writes artifacts.
//! - [`registry`]: worker records and termination counters shared by the
//!   controller and the reaper.
//! - [`artifact`]: `file<pid>.hist` output files.
//!
//! # Lifecycle
//!
//! ```text
//! controller ──spawn(i)──► worker(i) ──frame──► channel(i)
//!     │                        │
//!     │ insert record(i)       └──exit──► watcher(i) ──notice──► reaper
//!     │                                                            │
//!     └── poll counters until reaped == workers ◄──── count, drain, write
//! ```

pub mod artifact;
pub mod config;
pub mod controller;
pub mod reaper;
pub mod registry;
pub mod worker;

pub use artifact::{artifact_path, ArtifactRecord};
pub use config::{SupervisorConfig, WorkerTiming, DEFAULT_MARKER, MAX_WORKERS};
pub use controller::{supervise, SuperviseReport};
pub use reaper::{ExitNotice, ExitOutcome};
pub use registry::{RunTally, TerminationCounters};
pub use worker::{
    worker_main, WorkerInvocation, WorkerTask, EXIT_BAD_INVOCATION, EXIT_CHANNEL_FAILED,
    EXIT_INPUT_UNREADABLE, EXIT_SUCCESS, WORKER_SUBCOMMAND,
};
