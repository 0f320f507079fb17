//! Unidirectional worker channels backed by OS pipes.
//!
//! # Ownership
//! Each channel has exactly one reader (the controller) and one writer (the
//! worker process). Both ends are created close-on-exec so a worker spawned
//! later never inherits a sibling's write end; the write end handed to a
//! worker survives exec only because it is installed as that worker's stdout.
//!
//! # Draining
//! [`ReadEnd::drain`] switches the descriptor to non-blocking mode before
//! reading. After the worker has exited this returns whatever the worker
//! wrote; if a stray write end were still open somewhere it returns the bytes
//! available instead of hanging the reaper.

use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::process::Stdio;

/// Controller-owned read end.
#[derive(Debug)]
pub struct ReadEnd {
    fd: OwnedFd,
}

/// Worker-owned write end.
#[derive(Debug)]
pub struct WriteEnd {
    fd: OwnedFd,
}

/// Creates a new channel, returning `(read, write)`.
///
/// # Errors
/// Propagates the `pipe` failure (typically descriptor exhaustion).
pub fn create() -> io::Result<(ReadEnd, WriteEnd)> {
    let [read, write] = pipe_cloexec()?;
    Ok((ReadEnd { fd: read }, WriteEnd { fd: write }))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn pipe_cloexec() -> io::Result<[OwnedFd; 2]> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    // SAFETY: `fds` is a valid two-element array for the kernel to fill.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe2 succeeded, so both descriptors are open and owned by us.
    Ok(unsafe { [OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])] })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn pipe_cloexec() -> io::Result<[OwnedFd; 2]> {
    let mut fds: [libc::c_int; 2] = [-1; 2];
    // SAFETY: `fds` is a valid two-element array for the kernel to fill.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: pipe succeeded, so both descriptors are open and owned by us.
    let owned = unsafe { [OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])] };
    for fd in &owned {
        set_fd_flag(fd.as_raw_fd(), libc::F_GETFD, libc::F_SETFD, libc::FD_CLOEXEC)?;
    }
    Ok(owned)
}

fn set_fd_flag(
    fd: RawFd,
    get: libc::c_int,
    set: libc::c_int,
    flag: libc::c_int,
) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; no pointers involved.
    let current = unsafe { libc::fcntl(fd, get) };
    if current < 0 {
        return Err(io::Error::last_os_error());
    }
    if current & flag != 0 {
        return Ok(());
    }
    // SAFETY: same descriptor, setting a superset of the existing flags.
    let rc = unsafe { libc::fcntl(fd, set, current | flag) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

impl ReadEnd {
    /// Reads everything currently available and closes the read end.
    ///
    /// An empty result means the writer closed without sending anything.
    pub fn drain(self) -> io::Result<Vec<u8>> {
        set_fd_flag(
            self.fd.as_raw_fd(),
            libc::F_GETFL,
            libc::F_SETFL,
            libc::O_NONBLOCK,
        )?;
        let mut file = File::from(self.fd);
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            match file.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(buf)
    }

}

impl WriteEnd {
    /// Claims this process's stdout as the channel write end.
    ///
    /// Worker processes are spawned with their channel installed as fd 1.
    /// After this call the returned value owns fd 1; dropping it closes the
    /// channel. Nothing else in the process may write to stdout afterwards.
    pub fn from_stdout() -> Self {
        // SAFETY: fd 1 is open for the lifetime of a spawned worker and the
        // worker never touches `std::io::stdout()`, so this is the only owner.
        let fd = unsafe { OwnedFd::from_raw_fd(libc::STDOUT_FILENO) };
        Self { fd }
    }

    /// Converts into a `Stdio` so the spawned worker receives it as stdout.
    pub fn into_stdio(self) -> Stdio {
        Stdio::from(self.fd)
    }

    /// Converts into a writable file handle.
    pub fn into_file(self) -> File {
        File::from(self.fd)
    }
}
