use std::time::Duration;

use tracing::{debug, instrument};

use super::{ProcessHandle, StageOutcome};
use crate::error::{SandboxError, Stage};
use crate::language::{CommandSpec, SourceDelivery, TemplateContext};

/// Run the compiler, if the language has one.
///
/// Returns `Ok(None)` for interpreted languages. A compiler that runs and
/// fails is still `Ok`; only a compiler that cannot be started or talked
/// to is an `Err`.
#[instrument(skip_all, fields(compiler = spec.compile.as_ref().map(|c| c.program.as_str())))]
pub async fn compile(
    spec: &CommandSpec,
    ctx: &TemplateContext<'_>,
    limit: Option<Duration>,
) -> Result<Option<StageOutcome>, SandboxError> {
    let Some(template) = &spec.compile else {
        debug!("No compile stage");
        return Ok(None);
    };

    let (program, args) = template.expand(ctx)?;
    let process = ProcessHandle::spawn(&program, &args, ctx.workspace)?;

    let input = match spec.source {
        SourceDelivery::Stdin => Some(ctx.code.as_bytes()),
        SourceDelivery::File { .. } => None,
    };

    let outcome = process.finish(input, limit, Stage::Compile).await?;
    debug!(exit_code = outcome.exit_code, "Compilation finished");
    Ok(Some(outcome))
}
