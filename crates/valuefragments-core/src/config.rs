//! Optional config from .valuefragmentsrc or ~/.valuefragmentsrc (JSON).
//! Environment and CLI flags override it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::task_queue::{GroupOptions, How};
use crate::timing::DEFAULT_DECORATED_LOG;
use crate::utils::DEFAULT_MAX_AGE;

pub const CONFIG_FILE: &str = ".valuefragmentsrc";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Config {
    pub workers: Option<usize>,
    pub how: Option<How>,
    pub log_file: Option<PathBuf>,
    pub cache_max_age: Option<Duration>,
}

impl Config {
    /// Apply `VALUEFRAGMENTS_WORKERS` on top of the file values.
    pub fn with_env(mut self) -> Self {
        if let Some(n) = std::env::var("VALUEFRAGMENTS_WORKERS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            self.workers = Some(n);
        }
        self
    }

    pub fn group_options(&self) -> GroupOptions {
        let options = GroupOptions::default();
        match self.workers {
            Some(n) => options.with_workers(n),
            None => options,
        }
    }

    pub fn decorated_log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DECORATED_LOG))
    }

    pub fn cache_max_age(&self) -> Duration {
        self.cache_max_age.unwrap_or(DEFAULT_MAX_AGE)
    }
}

/// Load config from .valuefragmentsrc in dir, then ~/.valuefragmentsrc.
/// The first file found wins. Missing or invalid file = default.
pub fn load_config(dir: &Path) -> Config {
    let mut candidates = vec![dir.join(CONFIG_FILE)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE));
    }
    for path in &candidates {
        if path.is_file() {
            return read_config(path);
        }
    }
    Config::default()
}

fn read_config(path: &Path) -> Config {
    let mut cfg = Config::default();
    let Ok(s) = std::fs::read_to_string(path) else {
        return cfg;
    };
    let v = match serde_json::from_str::<serde_json::Value>(&s) {
        Ok(v) => v,
        Err(e) => {
            debug!("ignoring {}: {}", path.display(), e);
            return cfg;
        }
    };
    if let Some(n) = v.get("workers").and_then(|x| x.as_u64()).filter(|n| *n > 0) {
        cfg.workers = usize::try_from(n).ok();
    }
    if let Some(h) = v.get("how") {
        cfg.how = serde_json::from_value::<How>(h.clone()).ok();
    }
    if let Some(l) = v.get("logFile").and_then(|x| x.as_str()) {
        cfg.log_file = Some(PathBuf::from(l));
    }
    if let Some(secs) = v.get("cacheMaxAgeSecs").and_then(|x| x.as_u64()) {
        cfg.cache_max_age = Some(Duration::from_secs(secs));
    }
    cfg
}
