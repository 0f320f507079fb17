//! Error types for the supervisor.
//!
//! Errors are split by stage: [`ConfigError`] covers everything rejected
//! before a single worker exists, [`SupervisorError`] covers the fatal
//! resource failures of a running controller. Worker-local failures are not
//! errors at this level; they are observed as exit statuses and reported as
//! events.
//!
//! Both enums are `#[non_exhaustive]`; callers should keep a fallback arm.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Invalid invocation, detected before any worker is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No file or marker arguments.
    NoInputs,
    /// More inputs than the supervisor accepts.
    TooManyInputs { count: usize, max: usize },
    /// A flag value failed to parse or is out of range.
    InvalidValue { flag: &'static str, value: String },
    /// Unrecognized `--flag`.
    UnknownFlag(String),
    /// The marker value is empty.
    EmptyMarker,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInputs => write!(f, "no input files provided"),
            Self::TooManyInputs { count, max } => write!(
                f,
                "too many input files provided: {count} (maximum allowed is {max})"
            ),
            Self::InvalidValue { flag, value } => write!(f, "invalid {flag} value: {value}"),
            Self::UnknownFlag(flag) => write!(f, "unknown flag: {flag}"),
            Self::EmptyMarker => write!(f, "marker value must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Fatal controller failure. The run stops; artifacts already written stay.
#[derive(Debug)]
#[non_exhaustive]
pub enum SupervisorError {
    /// Invocation rejected before spawning.
    Config(ConfigError),
    /// Creating the channel for worker `index` failed.
    ChannelCreate { index: usize, source: io::Error },
    /// Spawning worker `index` failed.
    Spawn { index: usize, source: io::Error },
    /// Starting the exit watcher for worker `index` failed.
    WatcherStart { index: usize, source: io::Error },
    /// Creating an artifact file failed.
    ArtifactOpen { path: PathBuf, source: io::Error },
    /// Writing an artifact file failed after it was created.
    ArtifactWrite { path: PathBuf, source: io::Error },
    /// Resolving the worker program (current executable) failed.
    WorkerProgram(io::Error),
    /// Starting the reaper thread failed.
    ReaperStart(io::Error),
}

impl SupervisorError {
    /// Process exit code for this failure.
    #[inline]
    pub fn exit_code(&self) -> u8 {
        1
    }
}

impl fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::ChannelCreate { index, source } => {
                write!(f, "creating channel for worker {index} failed: {source}")
            }
            Self::Spawn { index, source } => {
                write!(f, "spawning worker {index} failed: {source}")
            }
            Self::WatcherStart { index, source } => {
                write!(f, "starting exit watcher for worker {index} failed: {source}")
            }
            Self::ArtifactOpen { path, source } => {
                write!(f, "opening artifact {} failed: {source}", path.display())
            }
            Self::ArtifactWrite { path, source } => {
                write!(f, "writing artifact {} failed: {source}", path.display())
            }
            Self::WorkerProgram(source) => {
                write!(f, "resolving worker program failed: {source}")
            }
            Self::ReaperStart(source) => write!(f, "starting reaper failed: {source}"),
        }
    }
}

impl std::error::Error for SupervisorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::ChannelCreate { source, .. }
            | Self::Spawn { source, .. }
            | Self::WatcherStart { source, .. }
            | Self::ArtifactOpen { source, .. }
            | Self::ArtifactWrite { source, .. }
            | Self::WorkerProgram(source)
            | Self::ReaperStart(source) => Some(source),
        }
    }
}

impl From<ConfigError> for SupervisorError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_messages() {
        assert_eq!(ConfigError::NoInputs.to_string(), "no input files provided");
        assert_eq!(
            ConfigError::TooManyInputs { count: 101, max: 100 }.to_string(),
            "too many input files provided: 101 (maximum allowed is 100)"
        );
    }

    #[test]
    fn io_sources_are_preserved() {
        let err = SupervisorError::ArtifactOpen {
            path: PathBuf::from("out/file1.hist"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("out/file1.hist"));
        let source = err.source().unwrap();
        assert_eq!(source.to_string(), "denied");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn config_converts() {
        let err: SupervisorError = ConfigError::NoInputs.into();
        assert!(matches!(err, SupervisorError::Config(ConfigError::NoInputs)));
    }
}
