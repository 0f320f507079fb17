//! Multi-process letter-frequency supervisor.
//!
//! ## Scope
//! A controller process starts one worker process per input argument. Each
//! worker reads its file, counts ASCII letters case-insensitively into a
//! 26-bucket histogram, and sends the result back over a dedicated channel.
//! The controller persists one `file<pid>.hist` artifact per worker that
//! exited normally with a valid result.
//!
//! ## Key invariants
//! - `reaped <= workers` at all times; the controller finishes exactly when
//!   they are equal.
//! - A worker's record exists before anything can report its exit.
//! - Artifacts come only from normal exits with exactly one valid frame.
//! - One argument equal to the marker (`SIG`) starts a worker that is
//!   interrupted immediately and never produces an artifact.
//!
//! ## Flow
//! `args -> cli -> supervisor::supervise -> spawn workers -> exit watchers ->
//! reaper -> wire::decode -> artifact`
//!
//! ## Notable entry points
//! - [`supervisor::supervise`] / [`SupervisorConfig`]: run a batch of workers.
//! - [`Histogram`]: the counting engine.
//! - [`wire`]: the channel frame format.
//! - [`events`]: structured diagnostics on stderr.

pub mod channel;
pub mod cli;
pub mod error;
pub mod events;
pub mod histogram;
pub mod supervisor;
#[cfg(test)]
pub mod test_utils;
pub mod wire;

pub use error::{ConfigError, SupervisorError};
pub use events::{EventFormat, EventSink, SupervisorEvent};
pub use histogram::{Histogram, ALPHABET_LEN};
pub use supervisor::{supervise, SuperviseReport, SupervisorConfig, MAX_WORKERS};
