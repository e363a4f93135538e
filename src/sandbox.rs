//! End-to-end compile-and-run pipeline.
//!
//! dispatch → compile (if any) → probe → [interactive rerun] → classify,
//! all inside a workspace that is removed before the call returns.
//! A `Sandbox` holds only immutable configuration, so concurrent
//! invocations share nothing but it.

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::SandboxError;
use crate::language::{CommandSpec, TemplateContext};
use crate::readiness::{self, ReadinessWait};
use crate::stage;
use crate::verdict::{ExecutionVerdict, FinalResult};
use crate::workspace::Workspace;

/// One source submission.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub source: String,
    pub language: String,
}

impl CompileRequest {
    pub fn new(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
        }
    }
}

/// Supplies one block of input when a program appears to wait for it.
#[async_trait]
pub trait InputProvider: Send + Sync {
    /// `None` means the user declined; empty input is used instead.
    async fn request_input(&self) -> Option<String>;
}

/// Answers every request with the same pre-supplied block.
#[derive(Debug, Clone, Default)]
pub struct StaticInput(Option<String>);

impl StaticInput {
    pub const fn new(input: Option<String>) -> Self {
        Self(input)
    }

    pub const fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl InputProvider for StaticInput {
    async fn request_input(&self) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug)]
pub struct Sandbox {
    config: Config,
    readiness: Box<dyn ReadinessWait>,
}

impl Sandbox {
    pub fn new(config: Config) -> Self {
        let readiness = readiness::for_kind(config.limits.readiness);
        Self { config, readiness }
    }

    /// Use a specific readiness strategy instead of the configured one.
    pub fn with_readiness(config: Config, readiness: Box<dyn ReadinessWait>) -> Self {
        Self { config, readiness }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Compile and run `request`, asking `input` for a block of text at
    /// most once. Never fails: every fault is folded into the result.
    #[instrument(skip_all, fields(language = %request.language, source_len = request.source.len()))]
    pub async fn compile_and_run(
        &self,
        request: &CompileRequest,
        input: &dyn InputProvider,
    ) -> FinalResult {
        if request.source.trim().is_empty() {
            return FinalResult::EmptyInput;
        }

        let Some(spec) = self.config.languages.resolve(&request.language) else {
            warn!("Unsupported language");
            return FinalResult::UnsupportedLanguage(request.language.clone());
        };

        let workspace = match Workspace::acquire(self.config.workspace_root.as_deref()) {
            Ok(ws) => ws,
            Err(e) => {
                error!(error = %e, "Cannot create workspace");
                return e.into();
            }
        };

        let result = match self.run_in(&workspace, spec, request, input).await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Invocation failed");
                e.into()
            }
        };

        workspace.release();
        info!(success = result.is_success(), "Invocation finished");
        result
    }

    async fn run_in(
        &self,
        workspace: &Workspace,
        spec: &CommandSpec,
        request: &CompileRequest,
        input: &dyn InputProvider,
    ) -> Result<FinalResult, SandboxError> {
        let limits = &self.config.limits;
        let source_path = workspace.write_source(spec, &request.source)?;
        let artifact = workspace.artifact_path(spec);
        let ctx = TemplateContext {
            workspace: workspace.path(),
            artifact: &artifact,
            source: source_path.as_deref(),
            code: &request.source,
        };

        if let Some(outcome) = stage::compile(spec, &ctx, limits.compile_timeout()).await? {
            if let Some(failure) = FinalResult::from_compile(outcome) {
                return Ok(failure);
            }
        }

        let verdict = stage::probe(
            spec,
            &ctx,
            self.readiness.as_ref(),
            limits.probe_window(),
            limits.run_timeout(),
        )
        .await;

        match verdict {
            ExecutionVerdict::Completed(outcome) => Ok(FinalResult::from_run(outcome)),
            ExecutionVerdict::InfrastructureError(e) => Err(e),
            ExecutionVerdict::LikelyAwaitingInput => {
                let text = input.request_input().await.unwrap_or_default();
                let outcome = stage::rerun(spec, &ctx, &text, limits.run_timeout()).await?;
                Ok(FinalResult::from_run(outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingInput {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InputProvider for CountingInput {
        async fn request_input(&self) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[tokio::test]
    async fn empty_source_short_circuits() {
        let sandbox = Sandbox::new(Config::default());
        for source in ["", "   ", "\n\t\n"] {
            let result = sandbox
                .compile_and_run(&CompileRequest::new(source, "c"), &StaticInput::none())
                .await;
            assert_eq!(result, FinalResult::EmptyInput);
        }
        // Empty wins even over an unknown language
        let result = sandbox
            .compile_and_run(&CompileRequest::new(" ", "cobol"), &StaticInput::none())
            .await;
        assert_eq!(result, FinalResult::EmptyInput);
    }

    #[tokio::test]
    async fn unknown_language_is_unsupported() {
        let sandbox = Sandbox::new(Config::default());
        let input = CountingInput {
            calls: AtomicUsize::new(0),
        };
        let result = sandbox
            .compile_and_run(&CompileRequest::new("print 1", "cobol"), &input)
            .await;
        assert_eq!(result, FinalResult::UnsupportedLanguage("cobol".into()));
        assert_eq!(input.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_polling_strategy_reruns_silent_reader() {
        let mut config = Config::default();
        config.limits.probe_window_ms = 300;
        config
            .apply_json(
                r#"{"languages": {"sh": {
                    "run": {"program": "sh", "args": ["-c", "{code}"]}
                }}}"#,
            )
            .unwrap();
        let sandbox = Sandbox::with_readiness(config, Box::new(crate::readiness::ExitPolling));

        let result = sandbox
            .compile_and_run(
                &CompileRequest::new("read x; echo \"got:$x\"", "sh"),
                &StaticInput::new(Some("3\n".into())),
            )
            .await;
        assert_eq!(result, FinalResult::Success("got:3\n".into()));
    }

    #[tokio::test]
    async fn static_input_repeats_block() {
        let input = StaticInput::new(Some("42\n".into()));
        assert_eq!(input.request_input().await.as_deref(), Some("42\n"));
        assert_eq!(input.request_input().await.as_deref(), Some("42\n"));
        assert_eq!(StaticInput::none().request_input().await, None);
    }
}
