//! Child processes with piped input and a wall-clock bound.

use std::ffi::OsStr;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long the pipe helpers may lag behind the child's exit.
const IO_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start `{}`: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("`{}` did not finish within {timeout_ms} ms and was killed", .program.display())]
    TimedOut { program: PathBuf, timeout_ms: u128 },
    #[error("i/o with `{}` failed: {source}", .program.display())]
    Io {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run `program` with `args`, feed it `input` and collect its output.
///
/// Input is written and both output pipes are drained on helper threads, so
/// a child that fills a pipe before reading its input cannot stall the call.
/// `timeout` bounds the whole call: once it elapses the child is killed, and
/// helpers still blocked on a pipe held open by a grandchild are abandoned.
/// Both cases report [`ProcessError::TimedOut`].
pub fn run_with_input<S: AsRef<OsStr>>(
    program: &Path,
    args: &[S],
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let deadline = Instant::now() + timeout;
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;

    let writer = match (child.stdin.take(), input) {
        (Some(mut stdin), Some(bytes)) => {
            let bytes = bytes.to_vec();
            Some(spawn_io(move || {
                let result = stdin.write_all(&bytes);
                drop(stdin);
                match result {
                    Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    other => other,
                }
            }))
        }
        _ => None,
    };
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = wait_until(&mut child, program, deadline, timeout)?;

    if let Some(writer) = writer {
        collect_io(&writer, program, deadline, timeout)?;
    }
    let stdout = match stdout {
        Some(reader) => collect_io(&reader, program, deadline, timeout)?,
        None => Vec::new(),
    };
    let stderr = match stderr {
        Some(reader) => collect_io(&reader, program, deadline, timeout)?,
        None => Vec::new(),
    };

    debug!(
        program = %program.display(),
        status = ?status.code(),
        stdout_bytes = stdout.len(),
        stderr_bytes = stderr.len(),
        "child process finished"
    );
    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
    })
}

/// Whether `program -V` (or any probe flag) exits successfully in time.
#[must_use]
pub fn probe(program: &Path, flag: &str, timeout: Duration) -> bool {
    match run_with_input::<&str>(program, &[flag], None, timeout) {
        Ok(output) => output.status.success(),
        Err(error) => {
            debug!(%error, "executable probe failed");
            false
        }
    }
}

fn wait_until(
    child: &mut Child,
    program: &Path,
    deadline: Instant,
    timeout: Duration,
) -> Result<ExitStatus, ProcessError> {
    loop {
        let polled = child.try_wait().map_err(|source| ProcessError::Io {
            program: program.to_path_buf(),
            source,
        })?;
        if let Some(status) = polled {
            return Ok(status);
        }

        if Instant::now() >= deadline {
            if let Err(error) = child.kill() {
                warn!(%error, program = %program.display(), "failed to kill timed out child");
            }
            if let Err(error) = child.wait() {
                warn!(%error, program = %program.display(), "failed to reap timed out child");
            }
            return Err(ProcessError::TimedOut {
                program: program.to_path_buf(),
                timeout_ms: timeout.as_millis(),
            });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> Receiver<io::Result<Vec<u8>>> {
    spawn_io(move || {
        let mut buffer = Vec::new();
        pipe.read_to_end(&mut buffer)?;
        Ok(buffer)
    })
}

fn spawn_io<T, F>(work: F) -> Receiver<io::Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> io::Result<T> + Send + 'static,
{
    let (sender, receiver) = mpsc::sync_channel(1);
    thread::spawn(move || {
        if sender.send(work()).is_err() {
            debug!("pipe helper finished after its caller gave up");
        }
    });
    receiver
}

fn collect_io<T>(
    receiver: &Receiver<io::Result<T>>,
    program: &Path,
    deadline: Instant,
    timeout: Duration,
) -> Result<T, ProcessError> {
    let wait = deadline.saturating_duration_since(Instant::now()) + IO_GRACE;
    match receiver.recv_timeout(wait) {
        Ok(result) => result.map_err(|source| ProcessError::Io {
            program: program.to_path_buf(),
            source,
        }),
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                program = %program.display(),
                "child pipes still open after the deadline, abandoning helper"
            );
            Err(ProcessError::TimedOut {
                program: program.to_path_buf(),
                timeout_ms: timeout.as_millis(),
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(ProcessError::Io {
            program: program.to_path_buf(),
            source: io::Error::other("pipe helper thread exited without a result"),
        }),
    }
}
