//! Hypervisor process helpers (unix).

use std::path::Path;
use std::time::Duration;

/// Poll interval while waiting for a process to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads a pid from a pid file. Missing or malformed files yield `None`.
pub(super) fn read_pid(path: &Path) -> Option<i32> {
    let contents = std::fs::read_to_string(path).ok()?;
    contents.trim().parse::<i32>().ok().filter(|pid| *pid > 0)
}

/// Returns true if a process with this pid exists and we may signal it.
///
/// A process owned by another user (EPERM) is never one of our VMs.
pub(super) fn is_alive(pid: i32) -> bool {
    // SAFETY: signal 0 performs permission and existence checks only.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Returns true if `pid` is alive and its executable name contains one of
/// `binaries`. A recycled pid from a stale pid file fails this check.
pub(super) fn is_hypervisor(pid: i32, binaries: &[&str]) -> bool {
    is_alive(pid)
        && executable_name(pid)
            .is_some_and(|name| binaries.iter().any(|binary| name.contains(binary)))
}

/// File name of the executable behind `pid`.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn executable_name(pid: i32) -> Option<String> {
    let cmdline = std::fs::read(format!("/proc/{pid}/cmdline")).ok()?;
    let argv0 = cmdline.split(|b| *b == 0).next().filter(|a| !a.is_empty());
    let name = match argv0 {
        Some(argv0) => String::from_utf8_lossy(argv0).into_owned(),
        None => std::fs::read_to_string(format!("/proc/{pid}/comm")).ok()?,
    };
    base_name(name.trim())
}

#[cfg(target_os = "macos")]
fn executable_name(pid: i32) -> Option<String> {
    let mut buf = vec![0u8; libc::PROC_PIDPATHINFO_MAXSIZE as usize];
    // SAFETY: buf is writable for the length passed.
    let len = unsafe { libc::proc_pidpath(pid, buf.as_mut_ptr().cast(), buf.len() as u32) };
    if len <= 0 {
        return None;
    }
    buf.truncate(len as usize);
    base_name(&String::from_utf8_lossy(&buf))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
fn executable_name(_pid: i32) -> Option<String> {
    None
}

fn base_name(path: &str) -> Option<String> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Sends a signal, treating an already-exited process as success.
pub(super) fn signal(pid: i32, sig: libc::c_int) -> std::io::Result<()> {
    // SAFETY: kill() with a positive pid targets exactly that process.
    let ret = unsafe { libc::kill(pid, sig) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

/// Waits up to `timeout` for a process to exit. Returns true if it did.
pub(super) async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
    !is_alive(pid)
}
