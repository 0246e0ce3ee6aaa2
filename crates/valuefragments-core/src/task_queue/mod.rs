//! Grouped execution of deferred calls.
//!
//! Jobs run on the runtime's blocking threads, a dedicated rayon pool or
//! dedicated worker processes; `parallel` keeps the plain rayon helpers.

mod grouped;
mod job;
mod parallel;
mod process_pool;
pub mod worker;

pub use grouped::{run_grouped, run_grouped_by_name, run_grouped_with, GroupError, GroupOptions, How};
pub use job::{Job, JobError, JobRegistry};
pub use parallel::parallel_map;
pub use process_pool::{
    WorkerCommand, WorkerReply, WorkerRequest, HANDSHAKE_TIMEOUT, WORKER_ENV, WORKER_HELLO,
};
