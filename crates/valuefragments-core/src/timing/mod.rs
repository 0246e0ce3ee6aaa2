//! Timing helpers: snapshots, scope guards, closure wrappers and the
//! decorated file log.
//!
//! The wrappers run a closure, print what they measured to stdout and hand
//! back the closure's value unchanged.

mod clock;
mod decorate;
mod guard;

use std::time::Instant;

use tracing::info;

pub use clock::{process_time, thread_time, CpuTimes, TimingReport};
pub use decorate::{log_decorated, log_decorated_async, DEFAULT_DECORATED_LOG};
pub use guard::{format_time_result, format_timing_line, LinuxTimeGuard, TimingGuard};

/// Run `f` and return its value with the timings it took.
pub fn timed<T, F: FnOnce() -> T>(f: F) -> (T, TimingReport) {
    let before = CpuTimes::now();
    let value = f();
    (value, CpuTimes::now().since(&before))
}

/// Monotonic wall clock only: prints `name seconds`.
pub fn timing_wall<T, F: FnOnce() -> T>(name: &str, f: F) -> T {
    let before = Instant::now();
    let value = f();
    let secs = before.elapsed().as_secs_f64();
    println!("{} {}", name, secs);
    info!(name, wall = secs, "timing_wall");
    value
}

/// Wall time with user and system split, like the `time` command.
pub fn portable_timing<T, F: FnOnce() -> T>(name: &str, f: F) -> T {
    let (value, r) = timed(f);
    println!("{:10}", name);
    println!(
        "{:8.3} [s] \t(User: {:8.3} [s],\tSystem {:8.3} [s]) {:6.2}% Load",
        r.elapsed,
        r.total_user(),
        r.total_system(),
        r.load()
    );
    value
}

/// Own and children's CPU time listed separately, then the totals.
pub fn linuxtime<T, F: FnOnce() -> T>(name: &str, f: F) -> T {
    let (value, r) = timed(f);
    println!("time function\t {}", name);
    println!(
        "user:  {} + {} = {} [s]",
        r.user,
        r.children_user,
        r.total_user()
    );
    println!(
        "system {} + {} = {} [s]",
        r.system,
        r.children_system,
        r.total_system()
    );
    println!("real: {:.3} [s]\t {:.2} % load", r.elapsed, r.load());
    value
}

/// Process CPU time spent in `f`: prints `name seconds`.
pub fn timing_process_time<T, F: FnOnce() -> T>(name: &str, f: F) -> T {
    let before = process_time();
    let value = f();
    let secs = process_time().saturating_sub(before).as_secs_f64();
    println!("{} {}", name, secs);
    value
}

/// CPU time of the calling thread spent in `f`: prints `name seconds`.
pub fn timing_thread_time<T, F: FnOnce() -> T>(name: &str, f: F) -> T {
    let before = thread_time();
    let value = f();
    let secs = thread_time().saturating_sub(before).as_secs_f64();
    println!("{} {}", name, secs);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrappers_pass_values_through() {
        assert_eq!(timing_wall("wall", || 1), 1);
        assert_eq!(portable_timing("portable", || "two"), "two");
        assert_eq!(linuxtime("linux", || vec![3]), vec![3]);
        assert_eq!(timing_process_time("process", || 4.0), 4.0);
        assert_eq!(timing_thread_time("thread", || Some(5)), Some(5));
    }

    #[test]
    fn test_timed_measures_sleep() {
        let (value, report) = timed(|| {
            std::thread::sleep(std::time::Duration::from_millis(30));
            7
        });
        assert_eq!(value, 7);
        assert!(report.elapsed >= 0.03);
        // sleeping burns little CPU
        assert!(report.load() < 100.0);
    }
}
