//! Readiness by multiplexing the output pipes with process exit.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use super::{Readiness, ReadinessWait};
use crate::error::SandboxError;
use crate::stage::ProcessHandle;

const CHUNK: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct PipeReadiness;

enum Event {
    Stdout(std::io::Result<usize>),
    Stderr(std::io::Result<usize>),
    Exited(std::io::Result<std::process::ExitStatus>),
    Elapsed,
}

#[async_trait]
impl ReadinessWait for PipeReadiness {
    #[instrument(skip_all, fields(window = ?window))]
    async fn wait(
        &self,
        process: &mut ProcessHandle,
        window: Duration,
    ) -> Result<Readiness, SandboxError> {
        let ProcessHandle {
            child,
            stdout,
            stderr,
            stdout_buf,
            stderr_buf,
            ..
        } = process;

        let mut out_chunk = [0u8; CHUNK];
        let mut err_chunk = [0u8; CHUNK];

        let event = tokio::select! {
            r = stdout.read(&mut out_chunk) => Event::Stdout(r),
            r = stderr.read(&mut err_chunk) => Event::Stderr(r),
            r = child.wait() => Event::Exited(r),
            () = tokio::time::sleep(window) => Event::Elapsed,
        };

        let readiness = match event {
            Event::Stdout(r) => {
                let n = r.map_err(|e| SandboxError::io("Failed to read stdout", e))?;
                stdout_buf.extend_from_slice(&out_chunk[..n]);
                Readiness::OutputReady
            }
            Event::Stderr(r) => {
                let n = r.map_err(|e| SandboxError::io("Failed to read stderr", e))?;
                stderr_buf.extend_from_slice(&err_chunk[..n]);
                Readiness::OutputReady
            }
            Event::Exited(r) => {
                r.map_err(|e| SandboxError::io("Failed to wait for process", e))?;
                Readiness::Exited
            }
            Event::Elapsed => Readiness::TimedOut,
        };

        debug!(?readiness, "Readiness wait finished");
        Ok(readiness)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn spawn_sh(dir: &std::path::Path, script: &str) -> ProcessHandle {
        ProcessHandle::spawn("sh", &["-c".to_string(), script.to_string()], dir).unwrap()
    }

    #[tokio::test]
    async fn output_wins_the_race() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = spawn_sh(dir.path(), "printf hi; sleep 5");
        let readiness = PipeReadiness
            .wait(&mut process, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::OutputReady);
        assert_eq!(process.stdout_buf, b"hi");
        process.terminate().await;
    }

    #[tokio::test]
    async fn stderr_counts_as_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = spawn_sh(dir.path(), "printf oops >&2; sleep 5");
        let readiness = PipeReadiness
            .wait(&mut process, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::OutputReady);
        assert_eq!(process.stderr_buf, b"oops");
        process.terminate().await;
    }

    #[tokio::test]
    async fn silent_blocked_reader_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = spawn_sh(dir.path(), "read x; echo \"$x\"");
        let readiness = PipeReadiness
            .wait(&mut process, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
        assert!(process.stdout_buf.is_empty());
        process.terminate().await;
    }

    #[tokio::test]
    async fn silent_quick_exit_is_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = spawn_sh(dir.path(), "exit 0");
        let readiness = PipeReadiness
            .wait(&mut process, Duration::from_secs(3))
            .await
            .unwrap();
        // The pipes close at exit, so either signal may arrive first.
        assert_ne!(readiness, Readiness::TimedOut);
    }
}
