//! Process stages: compile, probe and interactive rerun.
//!
//! Every child is spawned through [`ProcessHandle::spawn`] with all three
//! standard streams piped and `kill_on_drop` set. On unix the child also
//! leads its own process group, and the whole group is killed once the
//! stage is over, so anything the program started in the background dies
//! with it.

mod compile;
mod probe;
mod rerun;

pub use compile::compile;
pub use probe::probe;
pub use rerun::rerun;

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{SandboxError, Stage};

/// Exit status and captured output of one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Exit code of the process (0 = success, -1 = killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StageOutcome {
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A running child with its pipes taken out, plus any output already
/// read while probing for readiness.
#[derive(Debug)]
pub struct ProcessHandle {
    pub(crate) child: Child,
    pub(crate) group: ProcessGroup,
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: ChildStdout,
    pub(crate) stderr: ChildStderr,
    pub(crate) stdout_buf: Vec<u8>,
    pub(crate) stderr_buf: Vec<u8>,
}

impl ProcessHandle {
    pub fn spawn(program: &str, args: &[String], cwd: &Path) -> Result<Self, SandboxError> {
        debug!(program, ?args, "Spawning process");

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: program.to_string(),
            source,
        })?;
        let group = ProcessGroup::of(&child);

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or(SandboxError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SandboxError::MissingPipe("stderr"))?;

        Ok(Self {
            child,
            group,
            stdin,
            stdout,
            stderr,
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
        })
    }

    /// Feed `input` (if any), close stdin, read both streams to the end
    /// and wait for exit. The process group is killed as soon as the child
    /// exits, so background processes cannot hold the pipes open. On
    /// timeout everything is killed.
    pub async fn finish(
        self,
        input: Option<&[u8]>,
        limit: Option<Duration>,
        stage: Stage,
    ) -> Result<StageOutcome, SandboxError> {
        let Self {
            mut child,
            mut group,
            stdin,
            mut stdout,
            mut stderr,
            mut stdout_buf,
            mut stderr_buf,
        } = self;

        let deadline = limit.map(|l| Instant::now() + l);

        let run = async {
            let (fed, status, out, err) = tokio::join!(
                feed(stdin, input),
                async {
                    let status = child.wait().await;
                    group.kill().await;
                    status
                },
                stdout.read_to_end(&mut stdout_buf),
                stderr.read_to_end(&mut stderr_buf),
            );
            fed?;
            out.map_err(|e| SandboxError::io("Failed to read stdout", e))?;
            err.map_err(|e| SandboxError::io("Failed to read stderr", e))?;
            status.map_err(|e| SandboxError::io("Failed to wait for process", e))
        };

        let finished = within(deadline, run).await;
        let Some(status) = finished else {
            return Err(timed_out(&mut child, &mut group, stage, limit).await);
        };
        let status = status?;

        let outcome = StageOutcome {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
        };
        debug!(%stage, exit_code = outcome.exit_code, "Process finished");
        Ok(outcome)
    }

    /// Kill the process group and reap the child.
    pub async fn terminate(mut self) {
        self.group.kill().await;
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill process");
        }
    }
}

/// The process group led by a spawned child.
///
/// Killing goes through the shell's `kill` builtin with a negative pid,
/// which signals every member of the group. Dropping an unkilled group
/// kills it synchronously.
#[derive(Debug)]
pub(crate) struct ProcessGroup {
    id: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            id: if cfg!(unix) { child.id() } else { None },
        }
    }

    pub(crate) async fn kill(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let status = Command::new("sh")
            .args(["-c", &kill_script(id)])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match status {
            // Non-zero means the group was already empty
            Ok(status) => debug!(group = id, killed = status.success(), "Killed process group"),
            Err(e) => warn!(group = id, error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let status = std::process::Command::new("sh")
            .args(["-c", &kill_script(id)])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = status {
            warn!(group = id, error = %e, "Failed to kill process group");
        }
    }
}

fn kill_script(group: u32) -> String {
    format!("kill -KILL -{group}")
}

/// Write the whole input block, then drop stdin to signal end-of-input.
/// A program that exits without reading its input is not an error.
async fn feed(stdin: Option<ChildStdin>, input: Option<&[u8]>) -> Result<(), SandboxError> {
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };
    match stdin.write_all(input).await {
        Err(e) if e.kind() != ErrorKind::BrokenPipe => {
            Err(SandboxError::io("Failed to write to stdin", e))
        }
        _ => Ok(()),
    }
}

/// Run `fut` to completion, or until `deadline`. `None` means the
/// deadline passed first.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

async fn timed_out(
    child: &mut Child,
    group: &mut ProcessGroup,
    stage: Stage,
    limit: Option<Duration>,
) -> SandboxError {
    warn!(%stage, "Time limit reached, killing process");
    group.kill().await;
    if let Err(e) = child.kill().await {
        warn!(error = %e, "Failed to kill process");
    }
    SandboxError::TimedOut {
        stage,
        after: limit.unwrap_or_default(),
    }
}
