//! Process pool for grouped runs: spawns worker processes for one group,
//! feeds them newline-delimited JSON requests and tears them down afterwards.
//!
//! A worker announces itself with [`WORKER_HELLO`] before reading requests.
//! Children run with [`WORKER_ENV`] set, and a process carrying it refuses to
//! start a pool of its own.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tracing::debug;

use super::grouped::{collect_ordered, GroupError};
use super::job::{Job, JobError};

/// First line a worker writes, before any reply.
pub const WORKER_HELLO: &str = r#"{"worker":"valuefragments","protocol":1}"#;
/// Set in the environment of every spawned worker.
pub const WORKER_ENV: &str = "VALUEFRAGMENTS_WORKER";
/// How long a fresh worker may take to announce itself.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type ReplyLines = Lines<BufReader<ChildStdout>>;

/// One job sent to a worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: usize,
    pub job: String,
    pub payload: serde_json::Value,
}

/// A worker's answer to one request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerReply {
    pub id: usize,
    pub outcome: Result<serde_json::Value, JobError>,
}

/// Executable (plus arguments) that serves the worker protocol on stdin/stdout.
#[derive(Clone, Debug)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running executable, started as `<exe> worker`.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn spawn(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .env(WORKER_ENV, "1")
            .kill_on_drop(true)
            .spawn()
    }
}

type Outcome = (usize, Result<serde_json::Value, JobError>);

pub(crate) async fn run_in_processes<J: Job>(
    jobs: Vec<J>,
    workers: usize,
    command: &WorkerCommand,
) -> Result<Vec<J::Output>, GroupError> {
    if std::env::var_os(WORKER_ENV).is_some() {
        return Err(GroupError::PoolStartup(format!(
            "this process is itself a pool worker ({} is set); nested process pools are refused",
            WORKER_ENV
        )));
    }
    let count = jobs.len();
    let mut queue = VecDeque::with_capacity(count);
    for (id, job) in jobs.into_iter().enumerate() {
        let payload = serde_json::to_value(job).map_err(|e| JobError::Payload(e.to_string()))?;
        queue.push_back(WorkerRequest {
            id,
            job: J::NAME.to_string(),
            payload,
        });
    }
    let queue = Arc::new(Mutex::new(queue));

    let mut children = Vec::with_capacity(workers);
    for _ in 0..workers {
        match command.spawn() {
            Ok(child) => children.push(child),
            Err(e) => {
                shutdown(children).await;
                return Err(GroupError::PoolStartup(format!(
                    "spawning {}: {}",
                    command.program.display(),
                    e
                )));
            }
        }
    }

    let mut readers = Vec::with_capacity(children.len());
    for child in children.iter_mut() {
        match handshake(child, command).await {
            Ok(lines) => readers.push(lines),
            Err(message) => {
                shutdown(children).await;
                return Err(GroupError::PoolStartup(message));
            }
        }
    }
    debug!(workers = children.len(), jobs = count, "process pool started");

    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
    let mut drivers = JoinSet::new();
    for (child, lines) in children.iter_mut().zip(readers) {
        let Some(stdin) = child.stdin.take() else {
            continue;
        };
        drivers.spawn(drive_worker(
            stdin,
            lines,
            Arc::clone(&queue),
            Arc::clone(&cancel),
            tx.clone(),
        ));
    }
    drop(tx);

    let collected = collect_ordered(&mut rx, count, &cancel).await;

    // Drivers stop after their current request once cancel is raised and
    // close their worker's stdin on the way out.
    let mut driver_error = None;
    while let Some(joined) = drivers.join_next().await {
        let failure = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(e) => Some(GroupError::Teardown(e.to_string())),
        };
        if driver_error.is_none() {
            driver_error = failure;
        }
    }
    let teardown = wait_all(children).await;

    let values = match (collected, driver_error) {
        (Err(GroupError::Job(e)), _) => return Err(GroupError::Job(e)),
        (_, Some(e)) => return Err(e),
        (Err(e), None) => return Err(e),
        (Ok(values), None) => values,
    };
    teardown?;

    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| GroupError::Job(JobError::Payload(e.to_string())))
        })
        .collect()
}

/// Read the worker's first line and check it is [`WORKER_HELLO`].
async fn handshake(child: &mut Child, command: &WorkerCommand) -> Result<ReplyLines, String> {
    let program = command.program.display();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| format!("{}: stdout was not captured", program))?;
    let mut lines = BufReader::new(stdout).lines();
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, lines.next_line()).await {
        Ok(Ok(Some(line))) if line.trim() == WORKER_HELLO => Ok(lines),
        Ok(Ok(Some(line))) => Err(format!(
            "{} is not a valuefragments worker (first line {:?}); pass a worker command",
            program,
            line.chars().take(80).collect::<String>()
        )),
        Ok(Ok(None)) => Err(format!(
            "{} exited without announcing itself as a valuefragments worker",
            program
        )),
        Ok(Err(e)) => Err(format!("{}: reading worker hello: {}", program, e)),
        Err(_) => Err(format!(
            "{} did not announce itself as a worker within {:?}",
            program, HANDSHAKE_TIMEOUT
        )),
    }
}

async fn drive_worker(
    mut stdin: ChildStdin,
    mut lines: ReplyLines,
    queue: Arc<Mutex<VecDeque<WorkerRequest>>>,
    cancel: Arc<AtomicBool>,
    tx: UnboundedSender<Outcome>,
) -> Result<(), GroupError> {
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        let next = match queue.lock() {
            Ok(mut pending) => pending.pop_front(),
            Err(_) => None,
        };
        let Some(request) = next else {
            break;
        };
        let id = request.id;

        let mut line = serde_json::to_string(&request)
            .map_err(|e| GroupError::Protocol(e.to_string()))?;
        line.push('\n');
        if let Err(e) = send_line(&mut stdin, &line).await {
            cancel.store(true, Ordering::SeqCst);
            return Err(GroupError::Protocol(format!("writing request {}: {}", id, e)));
        }

        let reply = match lines.next_line().await {
            Ok(Some(text)) => serde_json::from_str::<WorkerReply>(&text)
                .map_err(|e| GroupError::Protocol(format!("reply to request {}: {}", id, e))),
            Ok(None) => Err(GroupError::Protocol(format!(
                "worker closed its output before answering request {}",
                id
            ))),
            Err(e) => Err(GroupError::Protocol(format!("reading reply {}: {}", id, e))),
        };
        match reply {
            Ok(reply) if reply.id == id => {
                let _ = tx.send((reply.id, reply.outcome));
            }
            Ok(reply) => {
                cancel.store(true, Ordering::SeqCst);
                return Err(GroupError::Protocol(format!(
                    "expected reply {} but got {}",
                    id, reply.id
                )));
            }
            Err(e) => {
                cancel.store(true, Ordering::SeqCst);
                return Err(e);
            }
        }
    }
    stdin.shutdown().await.ok();
    Ok(())
}

async fn send_line(stdin: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

/// Wait for every worker to exit; the first failure is reported.
async fn wait_all(children: Vec<Child>) -> Result<(), GroupError> {
    let mut first_error = None;
    for mut child in children {
        // stdin is closed by now, so a healthy worker sees EOF and exits
        drop(child.stdin.take());
        let status = child.wait().await;
        let failure = match status {
            Ok(status) if status.success() => None,
            Ok(status) => Some(GroupError::Teardown(describe_exit(status))),
            Err(e) => Some(GroupError::Teardown(e.to_string())),
        };
        if first_error.is_none() {
            first_error = failure;
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Kill and reap workers after a failed start.
async fn shutdown(children: Vec<Child>) {
    for mut child in children {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("worker exited with status {}", code),
        None => "worker terminated by signal".to_string(),
    }
}
