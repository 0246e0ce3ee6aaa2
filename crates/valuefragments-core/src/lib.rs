//! Core library for valuefragments: grouped call dispatch over threads, a
//! thread pool or worker processes, plus timing, math and file helpers.
//! Used by the CLI binary; the binary doubles as the process-pool worker.

pub mod config;
pub mod error_handling;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod human;
pub mod jobs;
pub mod load;
pub mod mathhelpers;
pub mod memoize;
pub mod process;
pub mod quiet;
pub mod task_queue;
pub mod timing;
pub mod utils;

pub use config::{load_config, Config};
pub use error_handling::{FragmentError, MathError};
#[cfg(feature = "fetch")]
pub use fetch::{selected_href_links, selected_href_links_cached};
pub use human::HumanReadable;
pub use jobs::builtin_registry;
pub use load::pi_for_cpu_load;
pub use mathhelpers::{determinant, easybisect, intp, polyroot, probneeds, BisectOptions};
pub use memoize::{memoize, Memoize};
pub use process::backgroundme;
pub use quiet::NoOutput;
pub use task_queue::{
    run_grouped, run_grouped_by_name, run_grouped_with, GroupError, GroupOptions, How, Job,
    JobError, JobRegistry,
};
pub use timing::{
    linuxtime, log_decorated, log_decorated_async, portable_timing, timed, timing_process_time,
    timing_thread_time, timing_wall, CpuTimes, LinuxTimeGuard, TimingGuard, TimingReport,
};
pub use utils::{
    basic_auth, file_exists_current, filecache, hash_files, hashfile, int2bin, log, log_error,
    recurse_files_in_folder, stringtovalidfilename, stringtovalidfilename2, thread_native_id,
};
