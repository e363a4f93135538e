//! Infrastructure faults raised while driving child processes.
//!
//! These never reach the caller directly: the sandbox converts every
//! `SandboxError` into a [`FinalResult::ExecutionError`](crate::verdict::FinalResult).

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage a fault or timeout belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Probe,
    Rerun,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => f.write_str("compilation"),
            Self::Probe | Self::Rerun => f.write_str("program"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    /// The toolchain or program binary could not be started at all.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("child process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("{stage} timed out after {}s", after.as_secs_f64())]
    TimedOut { stage: Stage, after: Duration },

    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("invalid command template: {0}")]
    Template(String),
}

impl SandboxError {
    pub(crate) const fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_stage() {
        let err = SandboxError::TimedOut {
            stage: Stage::Compile,
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "compilation timed out after 60s");

        let err = SandboxError::TimedOut {
            stage: Stage::Rerun,
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "program timed out after 1.5s");
    }

    #[test]
    fn spawn_message_includes_program() {
        let err = SandboxError::Spawn {
            program: "gcc".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        let msg = err.to_string();
        assert!(msg.contains("`gcc`"));
        assert!(msg.contains("No such file or directory"));
    }
}
