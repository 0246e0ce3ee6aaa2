//! Deferred calls: the `Job` trait, its error type and the name registry the
//! process-pool workers use to rebuild jobs from JSON.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A zero-argument unit of work, consumed once by the dispatcher.
///
/// Jobs and their outputs are serde types so that the same job can run on a
/// thread or be shipped to a worker process; `NAME` is the key under which a
/// worker's [`JobRegistry`] finds the job type again.
pub trait Job: Serialize + DeserializeOwned + Send + 'static {
    const NAME: &'static str;
    type Output: Serialize + DeserializeOwned + Send + 'static;

    fn run(self) -> Result<Self::Output, JobError>;
}

/// Failure of a single job. Crosses the process boundary unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum JobError {
    /// Bad value handed to or computed by the job
    #[error("{0}")]
    Value(String),
    #[error("{0}")]
    Io(String),
    #[error("{0}")]
    Failed(String),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("no job registered under name '{0}'")]
    UnknownJob(String),
    #[error("job payload could not be converted: {0}")]
    Payload(String),
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::Io(e.to_string())
    }
}

/// Run a job, turning a panic into `JobError::Panicked`.
pub(crate) fn run_caught<J: Job>(job: J) -> Result<J::Output, JobError> {
    panic::catch_unwind(AssertUnwindSafe(|| job.run())).unwrap_or_else(|payload| {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Err(JobError::Panicked(message))
    })
}

type Handler = Box<dyn Fn(serde_json::Value) -> Result<serde_json::Value, JobError> + Send + Sync>;

/// Job types a worker process can execute, keyed by `Job::NAME`.
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Handler>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register job type `J`. A later registration under the same name wins.
    pub fn register<J: Job>(&mut self) -> &mut Self {
        let handler: Handler = Box::new(|payload| {
            let job: J = serde_json::from_value(payload)
                .map_err(|e| JobError::Payload(format!("{}: {}", J::NAME, e)))?;
            let output = run_caught(job)?;
            serde_json::to_value(output).map_err(|e| JobError::Payload(e.to_string()))
        });
        self.handlers.insert(J::NAME, handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Decode the payload as the job registered under `name` and run it.
    pub fn run(&self, name: &str, payload: serde_json::Value) -> Result<serde_json::Value, JobError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))?;
        handler(payload)
    }
}
