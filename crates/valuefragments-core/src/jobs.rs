//! Built-in jobs, runnable on threads and on process-pool workers.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::load::pi_for_cpu_load;
use crate::mathhelpers::{polyroot, probneeds, FloatThreeVec};
use crate::task_queue::{Job, JobError, JobRegistry};
use crate::utils::{hashfile, HASH_CHUNK_LEN};

/// Monte-Carlo pi estimate, for CPU load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PiForCpuLoad {
    pub numiter: u64,
    pub seed: Option<u64>,
}

impl Job for PiForCpuLoad {
    const NAME: &'static str = "pi_for_cpu_load";
    type Output = f64;

    fn run(self) -> Result<f64, JobError> {
        Ok(pi_for_cpu_load(self.numiter, self.seed))
    }
}

/// SHA-256 of one file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HashFile {
    pub path: PathBuf,
}

impl Job for HashFile {
    const NAME: &'static str = "hashfile";
    type Output = String;

    fn run(self) -> Result<String, JobError> {
        hashfile(&self.path, HASH_CHUNK_LEN).map_err(|e| JobError::Io(e.to_string()))
    }
}

/// Roots of `a*x^2 + b*x + c = val`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolyRoot {
    pub coeffs: FloatThreeVec,
    pub val: f64,
}

impl Job for PolyRoot {
    const NAME: &'static str = "polyroot";
    type Output = (f64, f64);

    fn run(self) -> Result<(f64, f64), JobError> {
        polyroot(self.coeffs, self.val).map_err(|e| JobError::Value(e.to_string()))
    }
}

/// Probability that a stock covers independent Bernoulli needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbNeeds {
    pub needs: Vec<u64>,
    pub probs: Vec<f64>,
    pub avails: Option<u64>,
}

impl Job for ProbNeeds {
    const NAME: &'static str = "probneeds";
    type Output = f64;

    fn run(self) -> Result<f64, JobError> {
        probneeds(&self.needs, &self.probs, self.avails).map_err(|e| JobError::Value(e.to_string()))
    }
}

/// Registry holding every built-in job; what the `worker` command serves.
pub fn builtin_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry
        .register::<PiForCpuLoad>()
        .register::<HashFile>()
        .register::<PolyRoot>()
        .register::<ProbNeeds>();
    registry
}
