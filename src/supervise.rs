//! Supervision of the external stream engine subprocess.
//
// One SupervisedProcess wraps exactly one engine invocation. Its stdout and stderr are each
// drained by a dedicated reader task doing blocking line reads with channel hand-off (no
// sleep-polling), so each line is available to the consumer as soon as it is read. The line
// channels are bounded and the senders block when full: a slow consumer applies backpressure
// to the reader task rather than silently losing lines, since a dropped line could be a
// splice event. Lines from the two streams have no ordering guarantee relative to each
// other; within one stream, order is preserved.
//
// Lifecycle is a small state machine: Starting -> Running -> {Stopping -> Exited(code),
// Exited(code)}. A stop request sends SIGTERM (on unix) and escalates to a forced kill after
// the grace period. Stopping an already-exited process is a no-op, and the exit code is
// cached so late waiters return immediately. Failure to spawn at all (binary missing,
// unusable working directory) is a Spawn error, distinct from a non-zero exit code.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::SpliceError;


/// Capacity of each line channel. Senders block when the channel is full.
pub const LINE_CHANNEL_CAPACITY: usize = 256;

/// How long [`SupervisedProcess::stop`] waits for a graceful exit before force-killing.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Starting,
    Running,
    Stopping,
    Exited(i32),
}

/// Handle to one supervised engine run. The child process itself is owned exclusively by the
/// supervision task; callers hold only this handle and the two line channels.
#[derive(Debug)]
pub struct SupervisedProcess {
    state: watch::Receiver<ProcessState>,
    stop_tx: mpsc::Sender<Duration>,
    stdout_rx: Option<mpsc::Receiver<String>>,
    stderr_rx: Option<mpsc::Receiver<String>>,
}

fn exit_status_code(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        // A None code means death by signal; fold that into -1 so Exited always carries
        // something renderable.
        Ok(st) => st.code().unwrap_or(-1),
        Err(e) => {
            warn!("Error collecting engine exit status: {e}");
            -1
        }
    }
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to deliver SIGTERM to engine pid {pid}: {e}");
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    // No SIGTERM equivalent; go straight to the hard kill.
    if let Err(e) = child.start_kill() {
        warn!("Failed to kill engine process: {e}");
    }
}

// Drain one output stream line by line into its channel. A read error is reported as a
// synthesized line on the error channel rather than tearing anything down; the caller
// mid-stream decides whether to escalate.
fn spawn_reader<R>(
    reader: R,
    label: &'static str,
    tx: mpsc::Sender<String>,
    err_tx: mpsc::Sender<String>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        // Receiver dropped; nobody is listening any more.
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = err_tx
                        .send(format!("splice-console: read error on {label}: {e}"))
                        .await;
                    break;
                }
            }
        }
        debug!("Reader for engine {label} finished");
    });
}

/// Spawn the engine from an argument vector (element 0 is the binary) and supervise it.
/// Must be called within a tokio runtime.
pub fn spawn_supervised(cmd: &[String]) -> Result<SupervisedProcess, SpliceError> {
    let (program, args) = cmd
        .split_first()
        .ok_or_else(|| SpliceError::Spawn(String::from("empty command vector")))?;

    let (state_tx, state_rx) = watch::channel(ProcessState::Starting);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SpliceError::Spawn(format!("{program}: {e}")))?;
    info!("Spawned stream engine {program} (pid {:?})", child.id());

    let (stdout_tx, stdout_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    let (stderr_tx, stderr_rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
    if let Some(stdout) = child.stdout.take() {
        spawn_reader(stdout, "stdout", stdout_tx, stderr_tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        let err_tx = stderr_tx.clone();
        spawn_reader(stderr, "stderr", stderr_tx, err_tx);
    }

    let (stop_tx, mut stop_rx) = mpsc::channel::<Duration>(4);
    state_tx.send_replace(ProcessState::Running);
    tokio::spawn(async move {
        let code = loop {
            tokio::select! {
                status = child.wait() => {
                    break exit_status_code(status);
                }
                req = stop_rx.recv() => {
                    match req {
                        Some(grace) => {
                            state_tx.send_replace(ProcessState::Stopping);
                            request_termination(&mut child);
                            match tokio::time::timeout(grace, child.wait()).await {
                                Ok(status) => break exit_status_code(status),
                                Err(_elapsed) => {
                                    warn!("Engine ignored termination request for {grace:?}; killing");
                                    if let Err(e) = child.kill().await {
                                        warn!("Force kill failed: {e}");
                                    }
                                    break exit_status_code(child.wait().await);
                                }
                            }
                        }
                        // Stop handle dropped; just wait out the child.
                        None => break exit_status_code(child.wait().await),
                    }
                }
            }
        };
        info!("Stream engine exited with code {code}");
        state_tx.send_replace(ProcessState::Exited(code));
    });

    Ok(SupervisedProcess {
        state: state_rx,
        stop_tx,
        stdout_rx: Some(stdout_rx),
        stderr_rx: Some(stderr_rx),
    })
}

impl SupervisedProcess {
    /// Take the stdout line channel. Can only be taken once.
    pub fn stdout_lines(&mut self) -> Option<mpsc::Receiver<String>> {
        self.stdout_rx.take()
    }

    /// Take the stderr line channel (also carries synthesized read-error lines).
    pub fn stderr_lines(&mut self) -> Option<mpsc::Receiver<String>> {
        self.stderr_rx.take()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Request graceful termination, escalating to a forced kill after `grace`. Idempotent:
    /// stopping an already-exited (or already-stopping) process is a no-op, and this is safe
    /// to call from a different task than the one consuming the line channels.
    pub fn stop(&self, grace: Duration) {
        if matches!(self.state(), ProcessState::Exited(_)) {
            return;
        }
        // try_send so a second concurrent stop never blocks; a full or closed channel means
        // a stop is already in flight or the process is gone.
        let _ = self.stop_tx.try_send(grace);
    }

    /// Block until the terminal state is observed; the code is cached, so querying after
    /// exit returns immediately.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.state.clone();
        loop {
            if let ProcessState::Exited(code) = *rx.borrow() {
                return code;
            }
            if rx.changed().await.is_err() {
                // Sender gone without a terminal state; treat as abnormal exit.
                return -1;
            }
        }
    }
}

/// Map a terminal exit code onto the error taxonomy: zero is success, anything else is
/// reported (not auto-retried; retry policy belongs to the caller).
pub fn exit_error(code: i32) -> Result<(), SpliceError> {
    if code == 0 {
        Ok(())
    } else {
        Err(SpliceError::ChildExitedNonZero(code))
    }
}
