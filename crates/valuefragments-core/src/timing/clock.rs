//! CPU and wall clock snapshots.

use std::time::{Duration, Instant};

/// User and system CPU time of this process and its reaped children, plus a
/// monotonic wall clock reading.
#[derive(Clone, Copy, Debug)]
pub struct CpuTimes {
    pub user: Duration,
    pub system: Duration,
    pub children_user: Duration,
    pub children_system: Duration,
    pub at: Instant,
}

impl CpuTimes {
    pub fn now() -> Self {
        let (user, system) = rusage(Who::SelfProcess);
        let (children_user, children_system) = rusage(Who::Children);
        Self {
            user,
            system,
            children_user,
            children_system,
            at: Instant::now(),
        }
    }

    /// Differences from `earlier` to `self`, in seconds.
    pub fn since(&self, earlier: &CpuTimes) -> TimingReport {
        TimingReport {
            user: secs_between(earlier.user, self.user),
            system: secs_between(earlier.system, self.system),
            children_user: secs_between(earlier.children_user, self.children_user),
            children_system: secs_between(earlier.children_system, self.children_system),
            elapsed: self.at.saturating_duration_since(earlier.at).as_secs_f64(),
        }
    }
}

fn secs_between(before: Duration, after: Duration) -> f64 {
    after.saturating_sub(before).as_secs_f64()
}

/// Time spent between two [`CpuTimes`] snapshots, in seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimingReport {
    pub user: f64,
    pub system: f64,
    pub children_user: f64,
    pub children_system: f64,
    pub elapsed: f64,
}

impl TimingReport {
    pub fn total_user(&self) -> f64 {
        self.user + self.children_user
    }

    pub fn total_system(&self) -> f64 {
        self.system + self.children_system
    }

    /// CPU time over wall time in percent; 0 when no wall time passed.
    pub fn load(&self) -> f64 {
        if self.elapsed > 0.0 {
            100.0 * (self.total_user() + self.total_system()) / self.elapsed
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy)]
enum Who {
    SelfProcess,
    Children,
}

#[cfg(unix)]
fn rusage(who: Who) -> (Duration, Duration) {
    let who = match who {
        Who::SelfProcess => libc::RUSAGE_SELF,
        Who::Children => libc::RUSAGE_CHILDREN,
    };
    // SAFETY: rusage is plain old data and getrusage only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(who, &mut usage) } != 0 {
        return (Duration::ZERO, Duration::ZERO);
    }
    (timeval(usage.ru_utime), timeval(usage.ru_stime))
}

#[cfg(unix)]
fn timeval(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

#[cfg(not(unix))]
fn rusage(_who: Who) -> (Duration, Duration) {
    (Duration::ZERO, Duration::ZERO)
}

/// CPU time consumed by this process so far.
pub fn process_time() -> Duration {
    cpu_clock(Clock::Process)
}

/// CPU time consumed by the calling thread so far.
pub fn thread_time() -> Duration {
    cpu_clock(Clock::Thread)
}

#[derive(Clone, Copy)]
enum Clock {
    Process,
    Thread,
}

#[cfg(unix)]
fn cpu_clock(clock: Clock) -> Duration {
    let id = match clock {
        Clock::Process => libc::CLOCK_PROCESS_CPUTIME_ID,
        Clock::Thread => libc::CLOCK_THREAD_CPUTIME_ID,
    };
    // SAFETY: timespec is plain old data; clock_gettime only writes into it.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    if unsafe { libc::clock_gettime(id, &mut ts) } != 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec.clamp(0, 999_999_999) as u32)
}

#[cfg(not(unix))]
fn cpu_clock(clock: Clock) -> Duration {
    match clock {
        Clock::Process => {
            let (user, system) = rusage(Who::SelfProcess);
            user + system
        }
        Clock::Thread => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn burn(iterations: u64) -> u64 {
        (0..iterations).fold(0u64, |acc, x| acc.wrapping_add(x.wrapping_mul(x) ^ acc.rotate_left(5)))
    }

    #[test]
    fn test_report_is_non_negative() {
        let before = CpuTimes::now();
        std::hint::black_box(burn(2_000_000));
        let report = CpuTimes::now().since(&before);
        assert!(report.user >= 0.0 && report.system >= 0.0);
        assert!(report.elapsed > 0.0);
        assert!(report.load() >= 0.0);
    }

    #[test]
    fn test_load_without_elapsed_is_zero() {
        let report = TimingReport {
            user: 1.0,
            ..TimingReport::default()
        };
        assert_eq!(report.load(), 0.0);

        let busy = TimingReport {
            user: 1.0,
            children_user: 0.5,
            system: 0.5,
            elapsed: 4.0,
            ..TimingReport::default()
        };
        assert_eq!(busy.total_user(), 1.5);
        assert_eq!(busy.load(), 50.0);
    }

    #[test]
    fn test_cpu_clocks_advance() {
        let p0 = process_time();
        let t0 = thread_time();
        std::hint::black_box(burn(5_000_000));
        assert!(process_time() >= p0);
        assert!(thread_time() >= t0);
    }
}
