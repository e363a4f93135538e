//! Readiness by bounded wait on process exit only.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Readiness, ReadinessWait};
use crate::error::SandboxError;
use crate::stage::ProcessHandle;

/// Fallback for platforms without pipe polling. Output produced before
/// the window closes is not observed, so a chatty long-running program
/// is reported as [`Readiness::TimedOut`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitPolling;

#[async_trait]
impl ReadinessWait for ExitPolling {
    #[instrument(skip_all, fields(window = ?window))]
    async fn wait(
        &self,
        process: &mut ProcessHandle,
        window: Duration,
    ) -> Result<Readiness, SandboxError> {
        let waited = tokio::time::timeout(window, process.child.wait()).await;
        let readiness = match waited {
            Ok(status) => {
                status.map_err(|e| SandboxError::io("Failed to wait for process", e))?;
                Readiness::Exited
            }
            Err(_) => Readiness::TimedOut,
        };
        debug!(?readiness, "Exit wait finished");
        Ok(readiness)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exit_within_window() {
        let dir = tempfile::tempdir().unwrap();
        let mut process =
            ProcessHandle::spawn("sh", &["-c".into(), "echo fast".into()], dir.path()).unwrap();
        let readiness = ExitPolling
            .wait(&mut process, Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::Exited);
    }

    #[tokio::test]
    async fn output_without_exit_still_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut process =
            ProcessHandle::spawn("sh", &["-c".into(), "echo hi; sleep 5".into()], dir.path())
                .unwrap();
        let readiness = ExitPolling
            .wait(&mut process, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::TimedOut);
        process.terminate().await;
    }
}
