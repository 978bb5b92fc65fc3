//! Worker subprocess lifecycle: spawn, concurrent stream draining, timeout
//! race, termination and reaping.
//!
//! One request is one state machine pass: Idle → Spawning → Running →
//! Draining → Terminated. Both output streams are drained concurrently with
//! each other and with the deadline timer; a sequential read could deadlock
//! once the worker blocks on a full pipe nobody is reading. Everything waits
//! in a single `select!` race, never a poll loop.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::protocol::StdinPayload;
use crate::bridge::runtime::RuntimeHandle;
use crate::bridge::transfer::{InputChannel, OutputChannel, TransferPlan};
use crate::error::BridgeError;
use crate::{log_debug, log_warn};

/// Lifecycle states of one supervised request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Spawning,
    Running,
    Draining,
    Terminated,
}

/// Exit disposition of the reaped worker, decoupled from `ExitStatus` so the
/// interpreter can be exercised without spawning processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Clean,
    /// Non-zero exit; `None` when the process died to a signal.
    Failed(Option<i32>),
}

/// Everything captured from one worker run.
#[derive(Debug)]
pub struct CapturedOutput {
    pub primary: String,
    pub diagnostic: String,
    pub exit: ExitDisposition,
}

/// Per-run limits, already merged from config and per-call overrides.
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

/// Bound on waiting for stream EOF after the process is gone. Covers the
/// pathological case of a worker grandchild inheriting the pipes.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Run the worker once and capture its streams and exit disposition.
///
/// Does not interpret the output; that is the interpreter's job. Timeout and
/// output-overflow outcomes are decided here because they require terminating
/// the process.
pub async fn run(
    runtime: &RuntimeHandle,
    worker_script: &Path,
    plan: &TransferPlan,
    limits: &RunLimits,
    verbose: bool,
) -> Result<CapturedOutput, BridgeError> {
    let mut state = SupervisorState::Idle;

    let mut cmd = Command::new(&runtime.program);
    cmd.arg(worker_script);
    match &plan.input {
        InputChannel::Stream { .. } => {
            cmd.stdin(Stdio::piped());
        }
        InputChannel::File(input_path) => {
            cmd.arg(input_path);
            // File mode carries the result path as the second positional arg.
            match &plan.output {
                OutputChannel::File(path) | OutputChannel::Destination(path) => {
                    cmd.arg(path);
                }
                OutputChannel::Inline => {}
            }
            cmd.stdin(Stdio::null());
        }
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    runtime.apply_to_command(&mut cmd);

    enter(&mut state, SupervisorState::Spawning);
    let mut child = cmd
        .spawn()
        .map_err(|e| spawn_error(e, &runtime.program))?;

    if let InputChannel::Stream { content } = &plan.input {
        let payload = StdinPayload {
            content: content.as_str(),
            output: match &plan.output {
                OutputChannel::File(path) | OutputChannel::Destination(path) => {
                    Some(path.display().to_string())
                }
                OutputChannel::Inline => None,
            },
        };
        let json = serde_json::to_string(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("worker stdin was not piped"))?;
        tokio::spawn(async move {
            // A write error just means the worker exited before reading;
            // the exit path reports the real outcome.
            let _ = stdin.write_all(json.as_bytes()).await;
            let _ = stdin.shutdown().await;
        });
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("worker stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("worker stderr was not piped"))?;

    let (overflow_tx, mut overflow_rx) = mpsc::channel::<()>(2);
    let mut primary_task = tokio::spawn(drain_stream(
        stdout,
        limits.max_output_bytes,
        overflow_tx.clone(),
    ));
    let mut diagnostic_task = tokio::spawn(drain_stream(
        stderr,
        limits.max_output_bytes,
        overflow_tx,
    ));

    enter(&mut state, SupervisorState::Running);
    let started = Instant::now();
    let deadline = tokio::time::sleep(limits.timeout);
    tokio::pin!(deadline);

    // First-of-N race: process exit, deadline, or an output cap being hit.
    // The deadline loses the race permanently once the exit arm wins.
    let exit_status = tokio::select! {
        status = child.wait() => Some(status?),
        _ = &mut deadline => None,
        // Pattern disables this arm on channel close (both drains done at EOF).
        Some(()) = overflow_rx.recv() => {
            terminate(&mut child).await;
            let (_, diagnostic) =
                bounded_join(&mut primary_task, &mut diagnostic_task, DRAIN_GRACE).await;
            enter(&mut state, SupervisorState::Terminated);
            mirror_diagnostics(&diagnostic.0, verbose);
            log_warn!(
                "[SUPERVISOR] Worker output exceeded {} bytes, terminated",
                limits.max_output_bytes
            );
            return Err(BridgeError::OutputOverflow {
                limit: limits.max_output_bytes,
            });
        }
    };

    match exit_status {
        Some(status) => {
            enter(&mut state, SupervisorState::Draining);
            // Output already produced must be fully read before the outcome
            // is decided; the remaining deadline budget bounds that wait.
            let remaining = limits
                .timeout
                .saturating_sub(started.elapsed())
                .max(DRAIN_GRACE);
            let (primary, diagnostic) =
                bounded_join(&mut primary_task, &mut diagnostic_task, remaining).await;
            enter(&mut state, SupervisorState::Terminated);
            mirror_diagnostics(&diagnostic.0, verbose);

            if primary.1 || diagnostic.1 {
                return Err(BridgeError::OutputOverflow {
                    limit: limits.max_output_bytes,
                });
            }

            let exit = if status.success() {
                ExitDisposition::Clean
            } else {
                ExitDisposition::Failed(status.code())
            };
            log_debug!(
                "[SUPERVISOR] Worker exited {exit:?} after {} ms",
                started.elapsed().as_millis()
            );
            Ok(CapturedOutput {
                primary: primary.0,
                diagnostic: diagnostic.0,
                exit,
            })
        }
        None => {
            // Deadline fired first: no grace for partial output, but the
            // diagnostic stream is still captured so the operator log never
            // loses its cause.
            terminate(&mut child).await;
            let (_, diagnostic) =
                bounded_join(&mut primary_task, &mut diagnostic_task, DRAIN_GRACE).await;
            enter(&mut state, SupervisorState::Terminated);
            mirror_diagnostics(&diagnostic.0, verbose);

            let elapsed = started.elapsed();
            log_warn!(
                "[SUPERVISOR] Worker timed out after {} ms; diagnostics: {}",
                elapsed.as_millis(),
                diagnostic.0.trim()
            );
            Err(BridgeError::Timeout { elapsed })
        }
    }
}

fn enter(state: &mut SupervisorState, next: SupervisorState) {
    log_debug!("[SUPERVISOR] {:?} -> {next:?}", *state);
    *state = next;
}

fn spawn_error(e: io::Error, program: &Path) -> BridgeError {
    if e.kind() == io::ErrorKind::NotFound {
        BridgeError::RuntimeNotFound {
            tried: vec![program.display().to_string()],
        }
    } else {
        BridgeError::Io(e)
    }
}

/// Kill and reap. Failures are logged, not propagated: the primary outcome
/// is already decided by the time we get here.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log_debug!("[SUPERVISOR] Kill failed (may have already exited): {e}");
    }
    if let Err(e) = child.wait().await {
        log_warn!("[SUPERVISOR] Reap failed: {e}");
    }
}

/// Drain one stream into memory, capped. On overflow the drain stops reading
/// and signals the race in `run`, which terminates the worker.
async fn drain_stream<R>(
    mut stream: R,
    cap: usize,
    overflow_tx: mpsc::Sender<()>,
) -> (String, bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > cap {
                    let _ = overflow_tx.send(()).await;
                    return (String::from_utf8_lossy(&buf).into_owned(), true);
                }
            }
            Err(e) => {
                log_debug!("[SUPERVISOR] Stream read error: {e}");
                break;
            }
        }
    }
    (String::from_utf8_lossy(&buf).into_owned(), false)
}

/// Await both drain tasks within a bound; a task that cannot finish (pipes
/// held open by a worker grandchild) is aborted and contributes nothing.
async fn bounded_join(
    primary: &mut JoinHandle<(String, bool)>,
    diagnostic: &mut JoinHandle<(String, bool)>,
    bound: Duration,
) -> ((String, bool), (String, bool)) {
    let joined = tokio::time::timeout(bound, async {
        let p = (&mut *primary).await.unwrap_or_default();
        let d = (&mut *diagnostic).await.unwrap_or_default();
        (p, d)
    })
    .await;

    match joined {
        Ok(captured) => captured,
        Err(_) => {
            log_warn!("[SUPERVISOR] Streams still open {} ms after exit, abandoning", bound.as_millis());
            primary.abort();
            diagnostic.abort();
            ((String::new(), false), (String::new(), false))
        }
    }
}

fn mirror_diagnostics(diagnostic: &str, verbose: bool) {
    if !verbose {
        return;
    }
    for line in diagnostic.lines() {
        eprintln!("[WORKER] {line}");
    }
}
