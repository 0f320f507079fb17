//! Supervisor configuration.
//!
//! # Defaults
//!
//! | Parameter | Default | Meaning |
//! |-----------|---------|---------|
//! | `max_workers` | 100 | Inputs accepted per run |
//! | `marker` | `"SIG"` | Input that selects the wait-for-interrupt worker |
//! | `out_dir` | `.` | Artifact directory |
//! | `timing.base_delay` | 10 s | Post-result delay for worker 0 |
//! | `timing.stagger` | 3 s | Extra delay per worker index |
//! | `timing.marker_timeout` | 10 s | Marker worker idle limit |
//! | `poll_interval` | 1 s | Controller wait-loop period |
//!
//! The staggered delays only spread completions out so the reaper sees
//! several separate exit notifications; correctness never depends on them.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::events::EventFormat;

/// Maximum number of inputs (and therefore workers) per run.
pub const MAX_WORKERS: usize = 100;

/// Input value that selects the wait-for-interrupt worker.
pub const DEFAULT_MARKER: &str = "SIG";

/// Worker-side timing knobs, forwarded to every worker process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerTiming {
    /// Delay after sending the histogram, for worker 0.
    pub base_delay: Duration,
    /// Added to `base_delay` once per worker index.
    pub stagger: Duration,
    /// How long a marker worker idles before exiting on its own.
    pub marker_timeout: Duration,
}

impl WorkerTiming {
    /// Post-result delay for the worker at `index`.
    pub fn delay_for(&self, index: usize) -> Duration {
        let steps = u32::try_from(index).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_add(self.stagger.saturating_mul(steps))
    }

    /// Zero delays everywhere; handy for tests.
    pub const fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            stagger: Duration::ZERO,
            marker_timeout: Duration::ZERO,
        }
    }
}

impl Default for WorkerTiming {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(10),
            stagger: Duration::from_secs(3),
            marker_timeout: Duration::from_secs(10),
        }
    }
}

/// Controller configuration.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Upper bound on inputs. Invariant: >= 1.
    pub max_workers: usize,
    /// Marker input value. Invariant: non-empty.
    pub marker: String,
    /// Directory that receives `file<pid>.hist` artifacts.
    pub out_dir: PathBuf,
    /// Forwarded to each worker.
    pub timing: WorkerTiming,
    /// Wait-loop poll period.
    pub poll_interval: Duration,
    /// Executable to launch as a worker (`None` = current executable).
    ///
    /// The program must understand the hidden `__worker` sub-command.
    pub worker_program: Option<PathBuf>,
    /// Event encoding, also forwarded to workers.
    pub event_format: EventFormat,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: MAX_WORKERS,
            marker: DEFAULT_MARKER.to_string(),
            out_dir: PathBuf::from("."),
            timing: WorkerTiming::default(),
            poll_interval: Duration::from_secs(1),
            worker_program: None,
            event_format: EventFormat::default(),
        }
    }
}

impl SupervisorConfig {
    /// Checks the configuration against the number of inputs for this run.
    pub fn validate(&self, inputs: usize) -> Result<(), ConfigError> {
        if self.marker.is_empty() {
            return Err(ConfigError::EmptyMarker);
        }
        if inputs == 0 {
            return Err(ConfigError::NoInputs);
        }
        if inputs > self.max_workers {
            return Err(ConfigError::TooManyInputs {
                count: inputs,
                max: self.max_workers,
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                flag: "--poll-ms",
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_index() {
        let timing = WorkerTiming::default();
        assert_eq!(timing.delay_for(0), Duration::from_secs(10));
        assert_eq!(timing.delay_for(1), Duration::from_secs(13));
        assert_eq!(timing.delay_for(4), Duration::from_secs(22));
    }

    #[test]
    fn delay_saturates() {
        let timing = WorkerTiming {
            base_delay: Duration::MAX,
            stagger: Duration::from_secs(1),
            marker_timeout: Duration::ZERO,
        };
        assert_eq!(timing.delay_for(usize::MAX), Duration::MAX);
    }

    #[test]
    fn input_bounds() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.validate(0), Err(ConfigError::NoInputs));
        assert_eq!(cfg.validate(1), Ok(()));
        assert_eq!(cfg.validate(MAX_WORKERS), Ok(()));
        assert_eq!(
            cfg.validate(MAX_WORKERS + 1),
            Err(ConfigError::TooManyInputs {
                count: MAX_WORKERS + 1,
                max: MAX_WORKERS
            })
        );
    }

    #[test]
    fn empty_marker_rejected() {
        let cfg = SupervisorConfig {
            marker: String::new(),
            ..Default::default()
        };
        assert_eq!(cfg.validate(1), Err(ConfigError::EmptyMarker));
    }
}
