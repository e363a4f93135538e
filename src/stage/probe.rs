use std::time::Duration;

use tracing::{debug, info, instrument};

use super::ProcessHandle;
use crate::error::{SandboxError, Stage};
use crate::language::{CommandSpec, TemplateContext};
use crate::readiness::{Readiness, ReadinessWait};
use crate::verdict::ExecutionVerdict;

/// Run the program once and decide whether it finished on its own or
/// appears to be waiting for input.
///
/// The probe's stdin stays open during the window. Once output or exit is
/// seen, stdin is closed and the process is drained to completion under
/// `drain_limit`. If the window closes first the process is killed; it is
/// never reused for the interactive rerun.
#[instrument(skip_all, fields(program = %spec.run.program, window = ?window))]
pub async fn probe(
    spec: &CommandSpec,
    ctx: &TemplateContext<'_>,
    waiter: &dyn ReadinessWait,
    window: Duration,
    drain_limit: Option<Duration>,
) -> ExecutionVerdict {
    match run_probe(spec, ctx, waiter, window, drain_limit).await {
        Ok(verdict) => verdict,
        Err(e) => ExecutionVerdict::InfrastructureError(e),
    }
}

async fn run_probe(
    spec: &CommandSpec,
    ctx: &TemplateContext<'_>,
    waiter: &dyn ReadinessWait,
    window: Duration,
    drain_limit: Option<Duration>,
) -> Result<ExecutionVerdict, SandboxError> {
    let (program, args) = spec.run.expand(ctx)?;
    let mut process = ProcessHandle::spawn(&program, &args, ctx.workspace)?;

    match waiter.wait(&mut process, window).await? {
        Readiness::OutputReady | Readiness::Exited => {
            let outcome = process.finish(None, drain_limit, Stage::Probe).await?;
            debug!(exit_code = outcome.exit_code, "Program completed unattended");
            Ok(ExecutionVerdict::Completed(outcome))
        }
        Readiness::TimedOut => {
            info!("No output or exit within the window, program likely awaiting input");
            process.terminate().await;
            Ok(ExecutionVerdict::LikelyAwaitingInput)
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::language::{CommandTemplate, SourceDelivery};
    use crate::readiness::{ExitPolling, PipeReadiness};
    use std::path::Path;

    fn sh_spec() -> CommandSpec {
        CommandSpec {
            compile: None,
            run: CommandTemplate::new("sh", &["-c", "{code}"]),
            source: SourceDelivery::Stdin,
            artifact: "main".into(),
        }
    }

    async fn probe_sh(
        script: &str,
        waiter: &dyn ReadinessWait,
        window_ms: u64,
    ) -> ExecutionVerdict {
        let dir = tempfile::tempdir().unwrap();
        let artifact: &Path = &dir.path().join("main");
        let ctx = TemplateContext {
            workspace: dir.path(),
            artifact,
            source: None,
            code: script,
        };
        probe(
            &sh_spec(),
            &ctx,
            waiter,
            Duration::from_millis(window_ms),
            Some(Duration::from_secs(10)),
        )
        .await
    }

    #[tokio::test]
    async fn quick_program_completes() {
        let verdict = probe_sh("echo hello", &PipeReadiness, 2000).await;
        match verdict {
            ExecutionVerdict::Completed(outcome) => {
                assert_eq!(outcome.stdout, "hello\n");
                assert!(outcome.stderr.is_empty());
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn output_split_across_reads_is_complete() {
        let script = "printf a; sleep 0.2; printf b; echo c >&2";
        let verdict = probe_sh(script, &PipeReadiness, 2000).await;
        match verdict {
            ExecutionVerdict::Completed(outcome) => {
                assert_eq!(outcome.stdout, "ab");
                assert_eq!(outcome.stderr, "c\n");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prompt_then_read_gets_eof() {
        // Output arrives first, so stdin is closed and `read` sees EOF.
        let verdict = probe_sh("echo 'name?'; read x; echo \"got:$x\"", &PipeReadiness, 2000).await;
        match verdict {
            ExecutionVerdict::Completed(outcome) => assert_eq!(outcome.stdout, "name?\ngot:\n"),
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_reader_is_awaiting_input() {
        let verdict = probe_sh("read x; echo \"got:$x\"", &PipeReadiness, 300).await;
        assert!(matches!(verdict, ExecutionVerdict::LikelyAwaitingInput));
    }

    #[tokio::test]
    async fn exit_polling_completes_quick_program() {
        let verdict = probe_sh("echo hi", &ExitPolling, 2000).await;
        assert!(matches!(verdict, ExecutionVerdict::Completed(_)));
    }

    #[tokio::test]
    async fn exit_polling_reports_silent_reader() {
        let verdict = probe_sh("read x", &ExitPolling, 300).await;
        assert!(matches!(verdict, ExecutionVerdict::LikelyAwaitingInput));
    }

    #[tokio::test]
    async fn missing_program_is_infrastructure_error() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("main");
        let spec = CommandSpec {
            compile: None,
            run: CommandTemplate::new("{artifact}", &[]),
            source: SourceDelivery::Stdin,
            artifact: "main".into(),
        };
        let ctx = TemplateContext {
            workspace: dir.path(),
            artifact: &artifact,
            source: None,
            code: "",
        };
        let verdict = probe(&spec, &ctx, &PipeReadiness, Duration::from_millis(300), None).await;
        assert!(matches!(
            verdict,
            ExecutionVerdict::InfrastructureError(SandboxError::Spawn { .. })
        ));
    }
}
