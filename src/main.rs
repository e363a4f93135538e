//! polyrun
//!
//! Compile and run a single source file, prompting on the terminal if the
//! program waits for input, or serve the same pipeline over MCP stdio.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use polyrun::invocation::{spawn_invocation, InvocationEvent};
use polyrun::{mcp, CompileRequest, Config, Sandbox};

#[derive(Parser, Debug)]
#[command(name = "polyrun")]
#[command(about = "Compile and run single-file programs in a disposable workspace")]
struct Args {
    /// Path to a JSON configuration file (overrides POLYRUN_CONFIG)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Compile and run a source file
    Run {
        /// Language identifier (c, c++, java, python, ...)
        #[arg(long, short = 'l')]
        language: String,

        /// Source file
        file: PathBuf,

        /// Input for the program if it waits for input (skips the prompt)
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read program input from a file instead of prompting
        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// List supported languages
    Languages,

    /// Serve the MCP protocol
    Serve {
        /// Run in stdio mode (for MCP clients)
        #[arg(long)]
        stdio: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr so stdout is free for program output and MCP)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(languages = ?config.languages.names(), "Loaded configuration");

    match args.command {
        Cmd::Run {
            language,
            file,
            input,
            input_file,
        } => {
            let source = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let preset = match (input, input_file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                (None, None) => None,
            };

            let sandbox = Arc::new(Sandbox::new(config));
            let success = run(sandbox, CompileRequest::new(source, language), preset).await?;
            if !success {
                std::process::exit(1);
            }
        }
        Cmd::Languages => {
            for (name, spec) in config.languages.entries() {
                let kind = if spec.needs_compile() {
                    "compiled"
                } else {
                    "interpreted"
                };
                println!("{name}\t{kind}");
            }
        }
        Cmd::Serve { stdio } => {
            if !stdio {
                anyhow::bail!("Only --stdio mode is currently supported");
            }
            mcp::serve_stdio(Arc::new(Sandbox::new(config))).await?;
        }
    }

    Ok(())
}

/// Drive one invocation, answering its input request from `preset` or the
/// terminal. Returns whether the program succeeded.
async fn run(
    sandbox: Arc<Sandbox>,
    request: CompileRequest,
    preset: Option<String>,
) -> Result<bool> {
    let mut handle = spawn_invocation(sandbox, request);
    let mut preset = preset;

    while let Some(event) = handle.next_event().await {
        match event {
            InvocationEvent::InputRequested(reply) => {
                let text = match preset.take() {
                    Some(text) => text,
                    None => prompt_for_input().await?,
                };
                reply.provide(text);
            }
            InvocationEvent::Finished(result) => {
                println!("{result}");
                return Ok(result.is_success());
            }
        }
    }

    anyhow::bail!("Invocation ended without a result")
}

/// Read one block of input from the terminal, up to end-of-file.
async fn prompt_for_input() -> Result<String> {
    {
        let mut stderr = std::io::stderr().lock();
        writeln!(
            stderr,
            "Program appears to be waiting for input. Enter input, then Ctrl-D:"
        )?;
        stderr.flush()?;
    }

    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Failed to read program input")?;
    Ok(text)
}
