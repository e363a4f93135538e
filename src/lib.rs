//! polyrun library
//!
//! Compile-and-run sandbox for single-file programs:
//! - Table-driven language dispatch with configurable command templates
//! - Disposable per-invocation workspaces
//! - Compile stage, readiness probe and interactive rerun over child processes
//! - Background invocations with message-passing input requests
//! - MCP server exposing the pipeline as tools

pub mod config;
pub mod error;
pub mod invocation;
pub mod language;
pub mod mcp;
pub mod readiness;
pub mod sandbox;
pub mod stage;
pub mod verdict;
pub mod workspace;

pub use config::Config;
pub use sandbox::{CompileRequest, InputProvider, Sandbox, StaticInput};
pub use verdict::FinalResult;
