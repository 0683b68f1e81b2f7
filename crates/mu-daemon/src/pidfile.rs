//! PID-file lifecycle guard.
//!
//! Per spec.md §4.7: writes a PID file on start, refuses to start if the
//! file points at a live process, and removes it on graceful shutdown.
//! The teacher has no PID file at all -- it relies on OS-level named-pipe
//! exclusivity instead -- so this is new code, using the `libc`/
//! `windows-sys` liveness checks the teacher's `Cargo.toml` already
//! carries a per-platform dependency split for.
#![allow(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

/// Holds the path to an acquired PID file; removes it on drop.
pub struct PidFile {
    path: PathBuf,
    armed: bool,
}

impl PidFile {
    /// Acquire the PID file at `path`, refusing if it names a live process.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(existing_pid) = read_pid(path)? {
            if is_process_alive(existing_pid) {
                bail!(
                    "daemon already running: pid {existing_pid} ({})",
                    path.display()
                );
            }
            tracing::warn!(pid = existing_pid, "removing stale pid file");
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, std::process::id().to_string())?;

        Ok(Self { path: path.to_path_buf(), armed: true })
    }

    /// Remove the PID file. Idempotent.
    pub fn release(mut self) {
        self.remove();
        self.armed = false;
    }

    fn remove(&self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove pid file");
            }
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if self.armed {
            self.remove();
        }
    }
}

fn read_pid(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates the pid; EPERM means
    // the process exists but is owned by another user, which still counts
    // as alive for our purposes.
    let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.pid");

        let guard = PidFile::acquire(&path).expect("acquire");
        assert!(path.exists());
        assert_eq!(read_pid(&path).unwrap(), Some(std::process::id()));

        guard.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_acquire_refuses_live_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.pid");
        fs::write(&path, std::process::id().to_string()).expect("write");

        let result = PidFile::acquire(&path);
        assert!(result.is_err(), "should refuse to start over a live pid");
    }

    #[test]
    fn test_acquire_reclaims_stale_pid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.pid");
        // A pid astronomically unlikely to be alive.
        fs::write(&path, "4294000000").expect("write");

        let guard = PidFile::acquire(&path);
        assert!(guard.is_ok(), "should reclaim a stale pid file");
        guard.unwrap().release();
    }

    #[test]
    fn test_drop_without_release_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("daemon.pid");
        {
            let _guard = PidFile::acquire(&path).expect("acquire");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }
}
