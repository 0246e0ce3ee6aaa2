//! Helpers acting on the current process.

use tracing::debug;

use crate::error_handling::utils::io_error;
use crate::error_handling::FragmentError;

/// Niceness applied by [`backgroundme`].
pub const BACKGROUND_NICENESS: i32 = 19;

/// Give this process background priority.
pub fn backgroundme() -> Result<(), FragmentError> {
    #[cfg(unix)]
    {
        // SAFETY: plain syscall on our own process id (0 = calling process).
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, BACKGROUND_NICENESS) };
        if rc != 0 {
            return Err(io_error("backgroundme", None, std::io::Error::last_os_error()));
        }
        debug!("process priority lowered to nice {}", BACKGROUND_NICENESS);
        Ok(())
    }
    #[cfg(not(unix))]
    {
        debug!("background priority is not supported on this platform");
        Ok(())
    }
}

/// Current niceness of this process, where the platform reports one.
pub fn current_niceness() -> Option<i32> {
    #[cfg(unix)]
    {
        // SAFETY: getpriority has no memory-safety preconditions. -1 is a
        // valid niceness, so errors are not distinguished here.
        Some(unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) })
    }
    #[cfg(not(unix))]
    {
        None
    }
}
