//! Bounded "stream ready, process exited, or timed out" waits.
//!
//! The probe cannot know whether a program wants input, so it races a
//! window against the first sign of life. Two strategies exist:
//! native pipe multiplexing, and an exit-only wait for platforms where
//! pipes cannot be polled. With the latter, a program blocked on input
//! and one still computing past the window look the same.

mod exit_poll;
mod pipe;

pub use exit_poll::ExitPolling;
pub use pipe::PipeReadiness;

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ReadinessKind;
use crate::error::SandboxError;
use crate::stage::ProcessHandle;

/// What ended a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// stdout or stderr became readable (data or end-of-stream).
    OutputReady,
    /// The process exited within the window.
    Exited,
    /// Neither happened before the window closed.
    TimedOut,
}

/// Wait strategy used by the execution probe.
#[async_trait]
pub trait ReadinessWait: Debug + Send + Sync {
    /// Wait at most `window` for output or exit.
    ///
    /// Bytes consumed while checking readiness must be appended to the
    /// handle's buffers so the final output stays complete.
    async fn wait(
        &self,
        process: &mut ProcessHandle,
        window: Duration,
    ) -> Result<Readiness, SandboxError>;
}

/// Build the strategy selected in configuration.
pub fn for_kind(kind: ReadinessKind) -> Box<dyn ReadinessWait> {
    match kind {
        ReadinessKind::Pipe => Box::new(PipeReadiness),
        ReadinessKind::ExitPoll => Box::new(ExitPolling),
    }
}
