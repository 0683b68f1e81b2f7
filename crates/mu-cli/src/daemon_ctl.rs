//! Daemon process control for `mu daemon start|stop`.
//!
//! Reads the same PID file the daemon writes (see `mu-daemon`'s
//! `pidfile.rs`) to decide whether one is already running, and signals it
//! to shut down gracefully on stop. Spawning uses the sibling `mu-daemon`
//! binary located next to this executable, same as other multi-binary
//! cargo workspaces resolve their companion tools.
#![allow(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse::<u32>().ok()
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
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

/// Send a graceful-shutdown request to a running process. Unix delivers
/// `SIGINT`, which `mu-daemon`'s `tokio::signal::ctrl_c()` handler treats
/// the same as an interactive Ctrl+C. Windows has no equivalent signal
/// deliverable across process boundaries without a shared console, so this
/// falls back to an immediate terminate -- in-flight requests are not
/// drained in that case.
#[cfg(unix)]
fn request_shutdown(pid: u32) -> Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
    if result != 0 {
        bail!("failed to signal pid {pid}: {}", std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
fn request_shutdown(pid: u32) -> Result<()> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle.is_null() {
            bail!("failed to open pid {pid} for termination");
        }
        let ok = TerminateProcess(handle, 0);
        CloseHandle(handle);
        if ok == 0 {
            bail!("failed to terminate pid {pid}");
        }
    }
    Ok(())
}

fn daemon_binary_path() -> Result<PathBuf> {
    let mut exe = std::env::current_exe()?;
    exe.pop();
    let name = if cfg!(windows) { "mu-daemon.exe" } else { "mu-daemon" };
    Ok(exe.join(name))
}

/// Launch the daemon as a background child process (stdio inherited from
/// this CLI invocation, same as any other spawned tool), unless one is
/// already running against `pid_path`.
pub fn start(pid_path: &Path, repo: &str, bind: &str) -> Result<u32> {
    if let Some(pid) = read_pid(pid_path) {
        if is_process_alive(pid) {
            bail!("daemon already running: pid {pid}");
        }
    }

    let binary = daemon_binary_path()?;
    let child = std::process::Command::new(&binary)
        .arg("--repo")
        .arg(repo)
        .arg("--bind")
        .arg(bind)
        .spawn()
        .map_err(|e| anyhow!("failed to launch {}: {e}", binary.display()))?;
    Ok(child.id())
}

/// Signal a running daemon to shut down, waiting briefly for its PID file
/// to disappear. Returns `Ok(true)` if it was running and stopped,
/// `Ok(false)` if nothing was running.
pub fn stop(pid_path: &Path) -> Result<bool> {
    let Some(pid) = read_pid(pid_path) else {
        return Ok(false);
    };
    if !is_process_alive(pid) {
        return Ok(false);
    }

    request_shutdown(pid)?;

    for _ in 0..40 {
        if !pid_path.exists() {
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    bail!("daemon (pid {pid}) did not shut down within the timeout")
}
