//! Append start, timing and end lines for one call to a log file.
//!
//! Each line reads `timestamp|name|PID <pid>|ThID <tid>|message`.

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use tracing::warn;

use super::clock::{CpuTimes, TimingReport};
use crate::error_handling::utils::io_error;
use crate::error_handling::FragmentError;
use crate::utils::thread_native_id;

/// File used when the configuration names none.
pub const DEFAULT_DECORATED_LOG: &str = "decorated.log";

struct DecoratedLog {
    file: File,
    name: String,
}

impl DecoratedLog {
    fn open(name: &str, path: &Path) -> Result<Self, FragmentError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| io_error("log_decorated", Some(&path.to_string_lossy()), e))?;
        Ok(Self {
            file,
            name: name.to_string(),
        })
    }

    fn line(&mut self, message: &str) {
        let line = format!(
            "{}|{}|PID {}|ThID {}|{}",
            Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            self.name,
            std::process::id(),
            thread_native_id(),
            message
        );
        if let Err(e) = writeln!(self.file, "{}", line) {
            warn!("decorated log write failed: {}", e);
        }
    }

    fn timings(&mut self, r: &TimingReport) {
        self.line(&header_line());
        self.line(&timing_line(r));
    }
}

fn header_line() -> String {
    let mut out = String::new();
    for title in ["user", "system", "child_user", "child_system", "elapsed"] {
        out.push_str(&format!("{:>11.11}|", title));
    }
    out.push_str(&format!("{:>8.8}|", "LOAD"));
    out
}

fn timing_line(r: &TimingReport) -> String {
    let mut out = String::new();
    for value in [r.user, r.system, r.children_user, r.children_system, r.elapsed] {
        out.push_str(&format!("{:7.2} [s]|", value));
    }
    out.push_str(&format!("{:7.2}%|", r.load()));
    out
}

/// Run `f` and log its start, timings and end to `path`.
///
/// The file is opened before `f` runs; failing to open it is the only error.
pub fn log_decorated<T, F>(name: &str, path: &Path, f: F) -> Result<T, FragmentError>
where
    F: FnOnce() -> T,
{
    let mut log = DecoratedLog::open(name, path)?;
    log.line("LogDecorated Start");
    let before = CpuTimes::now();
    let value = f();
    let report = CpuTimes::now().since(&before);
    log.timings(&report);
    log.line("LogDecorated End");
    Ok(value)
}

/// [`log_decorated`] for a future.
pub async fn log_decorated_async<T, Fut>(name: &str, path: &Path, fut: Fut) -> Result<T, FragmentError>
where
    Fut: Future<Output = T>,
{
    let mut log = DecoratedLog::open(name, path)?;
    log.line("LogDecorated ASYNC Start");
    let before = CpuTimes::now();
    let value = fut.await;
    let report = CpuTimes::now().since(&before);
    log.timings(&report);
    log.line("LogDecorated ASYNC End");
    Ok(value)
}
