//! MCP server implementation using rmcp.
//!
//! Exposes the compile-and-run pipeline as MCP tools. MCP tool calls
//! cannot prompt mid-call, so a program that waits for input receives the
//! `input` parameter (or nothing) on its rerun.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::sandbox::{CompileRequest, Sandbox, StaticInput};

/// MCP server wrapping a [`Sandbox`].
#[derive(Clone)]
pub struct SandboxServer {
    sandbox: Arc<Sandbox>,
    tool_router: ToolRouter<Self>,
}

/// Parameters for the compile_and_run tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CompileAndRunParams {
    /// Language identifier (e.g., "c", "c++", "java", "python").
    #[schemars(description = "Language identifier, e.g. 'c', 'c++', 'java', 'python'")]
    pub language: String,

    /// Complete single-file source code.
    #[schemars(description = "Complete single-file source code")]
    pub code: String,

    /// Text piped to the program if it waits for input.
    #[schemars(description = "Text fed to standard input if the program waits for input")]
    #[serde(default)]
    pub input: Option<String>,
}

#[tool_router]
impl SandboxServer {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self {
            sandbox,
            tool_router: Self::tool_router(),
        }
    }

    /// Compile (if needed) and run a single source file.
    #[tool(description = "Compile and run a single-file program in a disposable workspace")]
    async fn compile_and_run(
        &self,
        Parameters(params): Parameters<CompileAndRunParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = CompileRequest::new(params.code, params.language);
        info!(language = %request.language, code_len = request.source.len(), "Compile and run");

        let result = self
            .sandbox
            .compile_and_run(&request, &StaticInput::new(params.input))
            .await;

        let text = result.to_string();
        if result.is_success() {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }

    /// List the configured language identifiers.
    #[tool(description = "List supported language identifiers")]
    async fn list_languages(&self) -> Result<CallToolResult, McpError> {
        let names = self.sandbox.config().languages.names().join("\n");
        Ok(CallToolResult::success(vec![Content::text(names)]))
    }
}

#[tool_handler]
impl ServerHandler for SandboxServer {
    fn get_info(&self) -> ServerInfo {
        let languages = self.sandbox.config().languages.names();

        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "polyrun".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Compile and run single-file programs.\n\
                 Supported languages: {languages:?}\n\
                 \n\
                 Use the 'compile_and_run' tool with:\n\
                 - language: one of {languages:?}\n\
                 - code: the complete source\n\
                 - input (optional): text for the program's standard input"
            )),
        }
    }
}

/// Serve the sandbox over stdio.
pub async fn serve_stdio(sandbox: Arc<Sandbox>) -> anyhow::Result<()> {
    let server = SandboxServer::new(sandbox);

    info!("Starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}
