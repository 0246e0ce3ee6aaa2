//! Worker side of the process pool: greet, then answer one JSON request per
//! line until the input closes.

use std::io::{self, BufRead, Write};

use tracing::debug;

use super::job::JobRegistry;
use super::process_pool::{WorkerReply, WorkerRequest, WORKER_HELLO};

/// Write [`WORKER_HELLO`], then serve requests from `input` until EOF with
/// one reply line per request. Returns the number of requests served.
pub fn serve<R, W>(registry: &JobRegistry, input: R, mut output: W) -> io::Result<usize>
where
    R: BufRead,
    W: Write,
{
    writeln!(output, "{}", WORKER_HELLO)?;
    output.flush()?;
    let mut served = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let request: WorkerRequest = serde_json::from_str(&line)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        debug!(id = request.id, job = %request.job, "worker request");
        let reply = WorkerReply {
            id: request.id,
            outcome: registry.run(&request.job, request.payload),
        };
        serde_json::to_writer(&mut output, &reply)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
    }
    Ok(served)
}
