//! Safe wrappers for platform-specific unsafe operations.
//!
//! Every `unsafe` block in the codebase lives here. Call sites use the safe
//! public API and never touch `unsafe` directly.

use std::io;

/// Signals that the supervisor sends to process groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSignal {
    /// SIGTERM: ask the group to exit.
    Terminate,
    /// SIGKILL: force the group to exit.
    Kill,
}

impl GroupSignal {
    fn as_raw(self) -> libc::c_int {
        match self {
            GroupSignal::Terminate => libc::SIGTERM,
            GroupSignal::Kill => libc::SIGKILL,
        }
    }
}

/// Return the effective user ID of the calling process.
///
/// # Safety
/// `getuid` is a read-only POSIX syscall with no preconditions.
pub fn current_uid() -> u32 {
    // SAFETY: getuid is a read-only POSIX syscall with no preconditions.
    unsafe { libc::getuid() }
}

/// Send `signal` to every process in group `pgid`.
///
/// Returns `Ok(false)` when the group no longer exists (ESRCH), which callers
/// treat as "already gone".
///
/// # Safety
/// `killpg` has no memory-safety preconditions; we refuse group ids <= 1 so a
/// bogus id can never address the caller's own group or every process.
pub fn signal_process_group(pgid: i32, signal: GroupSignal) -> io::Result<bool> {
    if pgid <= 1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to signal process group {pgid}"),
        ));
    }

    // SAFETY: killpg only inspects its integer arguments; pgid > 1 was checked.
    let rc = unsafe { libc::killpg(pgid, signal.as_raw()) };
    if rc == 0 {
        return Ok(true);
    }

    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::{Command, Stdio};
    use std::time::{Duration, Instant};

    #[test]
    fn current_uid_does_not_panic() {
        let _ = current_uid();
    }

    #[test]
    fn refuses_reserved_group_ids() {
        assert!(signal_process_group(0, GroupSignal::Terminate).is_err());
        assert!(signal_process_group(1, GroupSignal::Kill).is_err());
        assert!(signal_process_group(-5, GroupSignal::Kill).is_err());
    }

    #[test]
    fn missing_group_reports_gone() {
        // pid_max on Linux is at most 2^22, so this group cannot exist.
        let result = signal_process_group(i32::MAX - 7, GroupSignal::Terminate);
        assert!(matches!(result, Ok(false)), "got {:?}", result);
    }

    #[test]
    fn terminates_spawned_group() {
        let mut child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .process_group(0)
            .spawn()
            .expect("sleep should spawn");
        let pgid = child.id() as i32;

        assert!(matches!(
            signal_process_group(pgid, GroupSignal::Terminate),
            Ok(true)
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if child.try_wait().expect("try_wait").is_some() {
                break;
            }
            assert!(Instant::now() < deadline, "sleep survived SIGTERM");
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
