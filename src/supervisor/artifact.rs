//! Per-worker histogram artifacts.
//!
//! An artifact is a plain-text file of 26 `letter=count` lines, `a` first.
//! Its name comes from the worker's process id (`file<pid>.hist`), not from
//! the input path, so the same input maps to a different artifact on every
//! run.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SupervisorError;
use crate::histogram::Histogram;

/// One artifact written during a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub index: usize,
    pub pid: u32,
    pub path: PathBuf,
}

/// Artifact path for the worker with process id `pid`.
pub fn artifact_path(out_dir: &Path, pid: u32) -> PathBuf {
    out_dir.join(format!("file{pid}.hist"))
}

/// Creates (or truncates) the artifact for `pid` and writes `hist` into it.
///
/// # Errors
///
/// `ArtifactOpen` if the file cannot be created, `ArtifactWrite` if writing
/// or flushing fails. Both are fatal to the controller.
pub fn write_artifact(
    out_dir: &Path,
    pid: u32,
    hist: &Histogram,
) -> Result<PathBuf, SupervisorError> {
    let path = artifact_path(out_dir, pid);
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
    {
        Ok(f) => f,
        Err(source) => return Err(SupervisorError::ArtifactOpen { path, source }),
    };

    let mut out = BufWriter::new(file);
    let written = hist.write_lines(&mut out).and_then(|()| out.flush());
    match written {
        Ok(()) => Ok(path),
        Err(source) => Err(SupervisorError::ArtifactWrite { path, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn name_derives_from_pid() {
        assert_eq!(
            artifact_path(Path::new("out"), 4321),
            PathBuf::from("out/file4321.hist")
        );
    }

    #[test]
    fn writes_26_lines() {
        let dir = tempfile::tempdir().unwrap();
        let hist = Histogram::from_bytes(b"Hello World");
        let path = write_artifact(dir.path(), 77, &hist).unwrap();
        assert_eq!(path, dir.path().join("file77.hist"));

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 26);
        assert_eq!(lines[3], "d=1");
        assert_eq!(lines[11], "l=3");
        assert_eq!(lines[14], "o=2");
        assert_eq!(lines[0], "a=0");
    }

    #[test]
    fn existing_artifact_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact_path(dir.path(), 5);
        fs::write(&path, "x".repeat(4096)).unwrap();
        write_artifact(dir.path(), 5, &Histogram::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 26);
        assert!(text.lines().all(|l| l.ends_with("=0")));
    }

    #[test]
    fn missing_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_artifact(&missing, 1, &Histogram::default()).unwrap_err();
        assert!(matches!(err, SupervisorError::ArtifactOpen { .. }));
    }
}
