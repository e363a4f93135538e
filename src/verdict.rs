//! Probe verdicts and the caller-facing result.

use std::fmt;

use serde::Serialize;

use crate::error::SandboxError;
use crate::stage::StageOutcome;

/// What the execution probe concluded about one run attempt.
#[derive(Debug)]
pub enum ExecutionVerdict {
    /// The program produced output or exited within the window and was
    /// drained to completion.
    Completed(StageOutcome),
    /// No output and no exit within the window.
    LikelyAwaitingInput,
    InfrastructureError(SandboxError),
}

/// The only value an invocation hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FinalResult {
    /// Standard output of the program.
    Success(String),
    /// Compiler diagnostics, verbatim.
    CompileError(String),
    /// Program stderr, or a description of the infrastructure fault.
    ExecutionError(String),
    /// The identifier that failed to resolve.
    UnsupportedLanguage(String),
    EmptyInput,
}

impl FinalResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Classify a failed compile stage. Returns `None` when compilation
    /// succeeded and the pipeline should continue.
    pub fn from_compile(outcome: StageOutcome) -> Option<Self> {
        if outcome.success() {
            return None;
        }
        let detail = if !outcome.stderr.is_empty() {
            outcome.stderr
        } else if !outcome.stdout.is_empty() {
            outcome.stdout
        } else {
            format!("compiler exited with status {}", outcome.exit_code)
        };
        Some(Self::CompileError(detail))
    }

    /// Classify a finished run. Any stderr output marks the run as failed,
    /// whatever the exit code.
    pub fn from_run(outcome: StageOutcome) -> Self {
        if outcome.stderr.is_empty() {
            Self::Success(outcome.stdout)
        } else {
            Self::ExecutionError(outcome.stderr)
        }
    }
}

impl From<SandboxError> for FinalResult {
    fn from(err: SandboxError) -> Self {
        Self::ExecutionError(err.to_string())
    }
}

impl fmt::Display for FinalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(out) => write!(f, "Output:\n\n{out}"),
            Self::CompileError(detail) => write!(f, "Compilation Error:\n\n{detail}"),
            Self::ExecutionError(detail) => write!(f, "Execution Error:\n\n{detail}"),
            Self::UnsupportedLanguage(lang) => write!(f, "Unsupported language: {lang}"),
            Self::EmptyInput => f.write_str("No code to compile!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use std::time::Duration;

    fn outcome(exit_code: i32, stdout: &str, stderr: &str) -> StageOutcome {
        StageOutcome {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    #[test]
    fn successful_compile_continues() {
        assert!(FinalResult::from_compile(outcome(0, "", "warning: unused")).is_none());
    }

    #[test]
    fn failed_compile_surfaces_stderr_verbatim() {
        let result = FinalResult::from_compile(outcome(1, "", "main.c:1: error\n"));
        assert_eq!(
            result,
            Some(FinalResult::CompileError("main.c:1: error\n".into()))
        );
    }

    #[test]
    fn failed_compile_without_stderr_still_explains() {
        assert_eq!(
            FinalResult::from_compile(outcome(2, "javac: bad flag\n", "")),
            Some(FinalResult::CompileError("javac: bad flag\n".into()))
        );
        assert_eq!(
            FinalResult::from_compile(outcome(2, "", "")),
            Some(FinalResult::CompileError(
                "compiler exited with status 2".into()
            ))
        );
    }

    #[test]
    fn run_stderr_wins_over_exit_code() {
        assert_eq!(
            FinalResult::from_run(outcome(0, "partial", "warning\n")),
            FinalResult::ExecutionError("warning\n".into())
        );
        assert_eq!(
            FinalResult::from_run(outcome(1, "out\n", "")),
            FinalResult::Success("out\n".into())
        );
    }

    #[test]
    fn faults_become_execution_errors() {
        let result: FinalResult = SandboxError::TimedOut {
            stage: Stage::Rerun,
            after: Duration::from_secs(30),
        }
        .into();
        assert_eq!(
            result,
            FinalResult::ExecutionError("program timed out after 30s".into())
        );
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(
            FinalResult::Success("hello\n".into()).to_string(),
            "Output:\n\nhello\n"
        );
        assert_eq!(
            FinalResult::UnsupportedLanguage("cobol".into()).to_string(),
            "Unsupported language: cobol"
        );
        assert_eq!(FinalResult::EmptyInput.to_string(), "No code to compile!");
    }

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_string(&FinalResult::CompileError("x".into())).unwrap();
        assert_eq!(json, r#"{"kind":"compile_error","detail":"x"}"#);
        let json = serde_json::to_string(&FinalResult::EmptyInput).unwrap();
        assert_eq!(json, r#"{"kind":"empty_input"}"#);
    }
}
