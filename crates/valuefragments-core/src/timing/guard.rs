//! Scope guards that report timings when dropped.

use tracing::{debug, info};

use super::clock::{CpuTimes, TimingReport};

/// Prints user, system, wall and load for its scope when dropped.
pub struct TimingGuard {
    start: CpuTimes,
}

impl TimingGuard {
    pub fn new() -> Self {
        debug!("Prepared to run with Timing");
        Self {
            start: CpuTimes::now(),
        }
    }

    /// Timings so far, without ending the scope.
    pub fn report(&self) -> TimingReport {
        CpuTimes::now().since(&self.start)
    }
}

impl Default for TimingGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let r = self.report();
        println!("{}", format_timing_line(&r));
        info!(
            user = r.total_user(),
            system = r.total_system(),
            wall = r.elapsed,
            load = r.load(),
            "timing scope ended"
        );
    }
}

/// `   12.00 [s] User     1.00 [s] System ...` as printed by [`TimingGuard`].
pub fn format_timing_line(r: &TimingReport) -> String {
    format!(
        "{:8.2} [s] User {:8.2} [s] System {:8.2} [s] Wall {:8.2} [%] Load",
        r.total_user(),
        r.total_system(),
        r.elapsed,
        r.load()
    )
}

/// Reports like the `time` command when dropped.
pub struct LinuxTimeGuard {
    start: CpuTimes,
}

impl LinuxTimeGuard {
    pub fn new() -> Self {
        debug!("Prepared to run with LinuxTime");
        Self {
            start: CpuTimes::now(),
        }
    }

    pub fn report(&self) -> TimingReport {
        CpuTimes::now().since(&self.start)
    }
}

impl Default for LinuxTimeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LinuxTimeGuard {
    fn drop(&mut self) {
        let r = self.report();
        println!("{}", format_time_result(&r));
        info!(wall = r.elapsed, load = r.load(), "linuxtime scope ended");
    }
}

/// Three lines in the style of `time`: real, user, sys.
pub fn format_time_result(r: &TimingReport) -> String {
    format!(
        "real\t{:.3} [s]\nuser\t{:.3} [s]\nsys\t{:.3} [s]\t{:.2} % load",
        r.elapsed,
        r.total_user(),
        r.total_system(),
        r.load()
    )
}
