//! Silence stdout and stderr for a scope.

use std::io::{self, Write};

use crate::error_handling::utils::io_error;
use crate::error_handling::FragmentError;

/// Redirects file descriptors 1 and 2 to the null device until dropped.
///
/// Affects the whole process, including child processes started meanwhile.
/// Does nothing on platforms without unix file descriptors.
pub struct NoOutput {
    #[cfg(unix)]
    saved: Vec<(libc::c_int, libc::c_int)>,
}

#[cfg(unix)]
impl NoOutput {
    pub fn new() -> Result<Self, FragmentError> {
        use std::os::unix::io::AsRawFd;

        flush_std();
        let devnull = std::fs::OpenOptions::new()
            .write(true)
            .open("/dev/null")
            .map_err(|e| io_error("NoOutput", Some("/dev/null"), e))?;
        let mut guard = Self { saved: Vec::new() };
        for fd in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            // SAFETY: dup and dup2 only operate on descriptor numbers; fd is
            // a standard descriptor and devnull stays open for both calls.
            let copy = unsafe { libc::dup(fd) };
            if copy < 0 {
                return Err(io_error("NoOutput dup", None, io::Error::last_os_error()));
            }
            guard.saved.push((fd, copy));
            if unsafe { libc::dup2(devnull.as_raw_fd(), fd) } < 0 {
                return Err(io_error("NoOutput dup2", None, io::Error::last_os_error()));
            }
        }
        Ok(guard)
    }
}

#[cfg(not(unix))]
impl NoOutput {
    pub fn new() -> Result<Self, FragmentError> {
        Ok(Self {})
    }
}

fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

impl Drop for NoOutput {
    fn drop(&mut self) {
        flush_std();
        #[cfg(unix)]
        for (fd, copy) in self.saved.drain(..).rev() {
            // SAFETY: copy was returned by dup above and is closed exactly once.
            unsafe {
                libc::dup2(copy, fd);
                libc::close(copy);
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn fd_is_open(fd: libc::c_int) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
    }

    #[test]
    fn test_no_output_restores_descriptors() {
        {
            let _quiet = NoOutput::new().unwrap();
            println!("swallowed");
            eprintln!("swallowed too");
        }
        assert!(fd_is_open(libc::STDOUT_FILENO));
        assert!(fd_is_open(libc::STDERR_FILENO));
        println!("visible again");
    }
}
