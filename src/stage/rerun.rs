use std::time::Duration;

use tracing::{debug, instrument};

use super::{ProcessHandle, StageOutcome};
use crate::error::{SandboxError, Stage};
use crate::language::{CommandSpec, TemplateContext};

/// Start a fresh run process, pipe `input` to it in full, close stdin and
/// wait for it to finish. No readiness probing happens here.
#[instrument(skip_all, fields(program = %spec.run.program, input_len = input.len()))]
pub async fn rerun(
    spec: &CommandSpec,
    ctx: &TemplateContext<'_>,
    input: &str,
    limit: Option<Duration>,
) -> Result<StageOutcome, SandboxError> {
    let (program, args) = spec.run.expand(ctx)?;
    let process = ProcessHandle::spawn(&program, &args, ctx.workspace)?;
    let outcome = process.finish(Some(input.as_bytes()), limit, Stage::Rerun).await?;
    debug!(exit_code = outcome.exit_code, "Interactive rerun finished");
    Ok(outcome)
}
