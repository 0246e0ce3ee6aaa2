//! Grouped execution: run a batch of jobs on shared blocking threads, a
//! dedicated thread pool or dedicated worker processes, and hand the results
//! back in input order.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinSet;
use tracing::debug;

use super::job::{run_caught, Job, JobError};
use super::process_pool::{self, WorkerCommand};

/// How a group of jobs is executed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum How {
    /// Offload every job to the runtime's shared blocking threads.
    #[default]
    Thread,
    /// Fresh thread pool, torn down when the group is done.
    Tpe,
    /// Fresh worker processes, torn down when the group is done.
    Ppe,
}

impl How {
    pub fn as_str(&self) -> &'static str {
        match self {
            How::Thread => "thread",
            How::Tpe => "tpe",
            How::Ppe => "ppe",
        }
    }
}

impl fmt::Display for How {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for How {
    type Err = GroupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thread" => Ok(How::Thread),
            "tpe" => Ok(How::Tpe),
            "ppe" => Ok(How::Ppe),
            other => Err(GroupError::InvalidArgument(format!(
                "how was '{}' but needs to be one of {{'thread','tpe','ppe'}}.",
                other
            ))),
        }
    }
}

/// Failure of a grouped run.
#[derive(Debug, Error)]
pub enum GroupError {
    /// Unknown execution mode; raised before any job is scheduled.
    #[error("{0}")]
    InvalidArgument(String),
    /// First job failure, as the job reported it.
    #[error(transparent)]
    Job(#[from] JobError),
    #[error("could not start pool: {0}")]
    PoolStartup(String),
    #[error("pool teardown failed: {0}")]
    Teardown(String),
    #[error("worker protocol error: {0}")]
    Protocol(String),
}

/// Pool sizing and worker executable for a grouped run.
#[derive(Clone, Debug, Default)]
pub struct GroupOptions {
    /// Threads (`Tpe`) or processes (`Ppe`); defaults to the CPU count.
    pub workers: Option<usize>,
    /// Executable serving the worker protocol (`Ppe`); defaults to the current
    /// executable with a `worker` argument.
    pub worker_command: Option<WorkerCommand>,
}

impl GroupOptions {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers.max(1));
        self
    }

    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    fn worker_count(&self, jobs: usize) -> usize {
        self.workers
            .unwrap_or_else(num_cpus::get)
            .clamp(1, jobs.max(1))
    }
}

/// Run all jobs as described by `how` and return their outputs in input order.
pub async fn run_grouped<J: Job>(jobs: Vec<J>, how: How) -> Result<Vec<J::Output>, GroupError> {
    run_grouped_with(jobs, how, &GroupOptions::default()).await
}

/// Like [`run_grouped`], with the mode given by name (`"thread"`, `"tpe"`, `"ppe"`).
pub async fn run_grouped_by_name<J: Job>(
    jobs: Vec<J>,
    how: &str,
) -> Result<Vec<J::Output>, GroupError> {
    let how: How = how.parse()?;
    run_grouped(jobs, how).await
}

/// Like [`run_grouped`], with explicit pool options.
pub async fn run_grouped_with<J: Job>(
    jobs: Vec<J>,
    how: How,
    options: &GroupOptions,
) -> Result<Vec<J::Output>, GroupError> {
    debug!(job = J::NAME, count = jobs.len(), %how, "run_grouped");
    if jobs.is_empty() {
        return Ok(Vec::new());
    }
    match how {
        How::Thread => run_on_blocking_threads(jobs).await,
        How::Tpe => {
            let workers = options.worker_count(jobs.len());
            run_in_thread_pool(jobs, workers).await
        }
        How::Ppe => {
            let workers = options.worker_count(jobs.len());
            let command = match &options.worker_command {
                Some(command) => command.clone(),
                None => WorkerCommand::current_exe()
                    .map_err(|e| GroupError::PoolStartup(format!("current executable: {}", e)))?,
            };
            process_pool::run_in_processes(jobs, workers, &command).await
        }
    }
}

async fn run_on_blocking_threads<J: Job>(jobs: Vec<J>) -> Result<Vec<J::Output>, GroupError> {
    let count = jobs.len();
    let mut set = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        set.spawn_blocking(move || (index, run_caught(job)));
    }

    let mut slots: Vec<Option<J::Output>> = (0..count).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(output))) => slots[index] = Some(output),
            Ok((_, Err(e))) => {
                set.abort_all();
                return Err(GroupError::Job(e));
            }
            Err(join_error) => {
                set.abort_all();
                return Err(GroupError::Job(JobError::Failed(join_error.to_string())));
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

async fn run_in_thread_pool<J: Job>(
    jobs: Vec<J>,
    workers: usize,
) -> Result<Vec<J::Output>, GroupError> {
    let count = jobs.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("valuefragments-tpe-{}", i))
        .build()
        .map_err(|e| GroupError::PoolStartup(e.to_string()))?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let skip = Arc::clone(&cancel);
    // The scope returns only after every spawned job ran or was skipped; the
    // pool is dropped right after it.
    let scope = tokio::task::spawn_blocking(move || {
        pool.scope(|s| {
            for (index, job) in jobs.into_iter().enumerate() {
                let tx = tx.clone();
                let skip = &skip;
                s.spawn(move |_| {
                    if skip.load(Ordering::Relaxed) {
                        return;
                    }
                    let _ = tx.send((index, run_caught(job)));
                });
            }
        });
        drop(pool);
    });

    let collected = collect_ordered(&mut rx, count, &cancel).await;
    let teardown = scope.await;
    let results = collected?;
    teardown.map_err(|e| GroupError::Teardown(e.to_string()))?;
    Ok(results)
}

/// Gather `count` indexed outcomes into input order, stopping at the first
/// failure and raising `cancel` so pending jobs are skipped.
pub(crate) async fn collect_ordered<T>(
    rx: &mut UnboundedReceiver<(usize, Result<T, JobError>)>,
    count: usize,
    cancel: &AtomicBool,
) -> Result<Vec<T>, GroupError> {
    let mut slots: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut filled = 0;
    while filled < count {
        match rx.recv().await {
            Some((index, Ok(output))) => {
                if index < count && slots[index].replace(output).is_none() {
                    filled += 1;
                }
            }
            Some((_, Err(e))) => {
                cancel.store(true, Ordering::SeqCst);
                return Err(GroupError::Job(e));
            }
            None => break,
        }
    }
    if filled < count {
        cancel.store(true, Ordering::SeqCst);
        return Err(GroupError::Protocol(format!(
            "{} of {} results missing",
            count - filled,
            count
        )));
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Constant(i64);

    impl Job for Constant {
        const NAME: &'static str = "constant";
        type Output = i64;

        fn run(self) -> Result<i64, JobError> {
            Ok(self.0)
        }
    }

    /// Sleeps longer for smaller values so completion order is reversed.
    #[derive(Serialize, Deserialize)]
    struct SlowConstant(u64);

    impl Job for SlowConstant {
        const NAME: &'static str = "slow_constant";
        type Output = u64;

        fn run(self) -> Result<u64, JobError> {
            std::thread::sleep(Duration::from_millis(10 * (6 - self.0.min(5))));
            Ok(self.0)
        }
    }

    static TOUCHED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Serialize, Deserialize)]
    struct Touch;

    impl Job for Touch {
        const NAME: &'static str = "touch";
        type Output = ();

        fn run(self) -> Result<(), JobError> {
            TOUCHED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Serialize, Deserialize)]
    enum MaybeBoom {
        Value(i64),
        Boom,
    }

    impl Job for MaybeBoom {
        const NAME: &'static str = "maybe_boom";
        type Output = i64;

        fn run(self) -> Result<i64, JobError> {
            match self {
                MaybeBoom::Value(v) => Ok(v),
                MaybeBoom::Boom => Err(JobError::Value("boom".to_string())),
            }
        }
    }

    static SLOW_FINISHED: AtomicUsize = AtomicUsize::new(0);

    #[derive(Serialize, Deserialize)]
    enum SlowOrBoom {
        Slow,
        Boom,
    }

    impl Job for SlowOrBoom {
        const NAME: &'static str = "slow_or_boom";
        type Output = ();

        fn run(self) -> Result<(), JobError> {
            match self {
                SlowOrBoom::Slow => {
                    std::thread::sleep(Duration::from_millis(200));
                    SLOW_FINISHED.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
                SlowOrBoom::Boom => {
                    // let the slow job get going first
                    std::thread::sleep(Duration::from_millis(50));
                    Err(JobError::Value("boom".to_string()))
                }
            }
        }
    }

    fn constants() -> Vec<Constant> {
        (1..=5).map(Constant).collect()
    }

    #[test]
    fn test_how_parse() {
        assert_eq!("thread".parse::<How>().unwrap(), How::Thread);
        assert_eq!("tpe".parse::<How>().unwrap(), How::Tpe);
        assert_eq!("ppe".parse::<How>().unwrap(), How::Ppe);
        assert!(matches!(
            "bogus".parse::<How>(),
            Err(GroupError::InvalidArgument(_))
        ));
        assert_eq!(How::Tpe.to_string(), "tpe");
    }

    #[tokio::test]
    async fn test_thread_keeps_input_order() {
        let results = run_grouped(constants(), How::Thread).await.unwrap();
        assert_eq!(results, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_tpe_keeps_input_order() {
        let results = run_grouped(constants(), How::Tpe).await.unwrap();
        assert_eq!(results, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_order_independent_of_completion() {
        let jobs = || (1..=5).map(SlowConstant).collect::<Vec<_>>();
        let options = GroupOptions::default().with_workers(5);
        for how in [How::Thread, How::Tpe] {
            let results = run_grouped_with(jobs(), how, &options).await.unwrap();
            assert_eq!(results, vec![1, 2, 3, 4, 5], "mode {}", how);
        }
    }

    #[tokio::test]
    async fn test_single_worker_pool() {
        let options = GroupOptions::default().with_workers(1);
        let results = run_grouped_with(constants(), How::Tpe, &options).await.unwrap();
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_group() {
        for how in [How::Thread, How::Tpe, How::Ppe] {
            let results = run_grouped(Vec::<Constant>::new(), how).await.unwrap();
            assert!(results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_bogus_mode_runs_nothing() {
        let jobs: Vec<Touch> = (0..3).map(|_| Touch).collect();
        let res = run_grouped_by_name(jobs, "bogus").await;
        assert!(matches!(res, Err(GroupError::InvalidArgument(_))));
        assert_eq!(TOUCHED.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_propagates_unwrapped() {
        for how in [How::Thread, How::Tpe] {
            let jobs = vec![
                MaybeBoom::Value(1),
                MaybeBoom::Value(2),
                MaybeBoom::Boom,
                MaybeBoom::Value(4),
            ];
            let err = run_grouped(jobs, how).await.unwrap_err();
            match err {
                GroupError::Job(JobError::Value(message)) => assert_eq!(message, "boom"),
                other => panic!("unexpected error {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_tpe_failure_waits_for_running_jobs() {
        let options = GroupOptions::default().with_workers(2);
        let jobs = vec![SlowOrBoom::Slow, SlowOrBoom::Boom];
        let err = run_grouped_with(jobs, How::Tpe, &options).await.unwrap_err();
        assert!(matches!(err, GroupError::Job(JobError::Value(_))), "{:?}", err);
        // the pool was torn down only after the slow job finished
        assert_eq!(SLOW_FINISHED.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let first = run_grouped(constants(), How::Tpe).await.unwrap();
        let second = run_grouped(constants(), How::Tpe).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_ppe_missing_worker_binary() {
        let options = GroupOptions::default()
            .with_worker_command(WorkerCommand::new("/definitely/not/a/worker-binary"));
        let err = run_grouped_with(constants(), How::Ppe, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, GroupError::PoolStartup(_)));
    }
}
