//! Sandbox configuration.
//!
//! Built-in defaults cover the reference language set. A JSON file, named
//! on the command line or via `POLYRUN_CONFIG`, can add or override
//! languages and replace the limits.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::language::LanguageTable;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_ENV: &str = "POLYRUN_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Supported languages, keyed by identifier.
    #[serde(default = "LanguageTable::builtin")]
    pub languages: LanguageTable,

    #[serde(default)]
    pub limits: Limits,

    /// Parent directory for per-invocation workspaces (system temp dir if unset).
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            languages: LanguageTable::builtin(),
            limits: Limits::default(),
            workspace_root: None,
        }
    }
}

/// Time limits for the three stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Window the probe races against the program's first output.
    #[serde(default = "default_probe_window")]
    pub probe_window_ms: u64,

    /// `None` waits for the compiler indefinitely.
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_seconds: Option<u64>,

    /// Bounds draining a completed probe and the interactive rerun.
    /// `None` waits indefinitely.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: Option<u64>,

    #[serde(default)]
    pub readiness: ReadinessKind,
}

/// Which readiness-wait strategy the probe uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessKind {
    /// Race pipe readability against process exit.
    Pipe,
    /// Bounded wait on process exit only.
    ExitPoll,
}

impl Default for ReadinessKind {
    fn default() -> Self {
        if cfg!(unix) {
            Self::Pipe
        } else {
            Self::ExitPoll
        }
    }
}

const fn default_probe_window() -> u64 {
    2000
}

#[allow(clippy::unnecessary_wraps)]
const fn default_compile_timeout() -> Option<u64> {
    Some(60)
}

#[allow(clippy::unnecessary_wraps)]
const fn default_run_timeout() -> Option<u64> {
    Some(30)
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            probe_window_ms: default_probe_window(),
            compile_timeout_seconds: default_compile_timeout(),
            run_timeout_seconds: default_run_timeout(),
            readiness: ReadinessKind::default(),
        }
    }
}

impl Limits {
    pub const fn probe_window(&self) -> Duration {
        Duration::from_millis(self.probe_window_ms)
    }

    pub fn compile_timeout(&self) -> Option<Duration> {
        self.compile_timeout_seconds.map(Duration::from_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_seconds.map(Duration::from_secs)
    }
}

/// Shape of a configuration file; every section is optional.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    languages: LanguageTable,
    #[serde(default)]
    limits: Option<Limits>,
    #[serde(default)]
    workspace_root: Option<PathBuf>,
}

impl Config {
    /// Load configuration: built-in defaults, overlaid by `path` if given,
    /// else by the file named in `POLYRUN_CONFIG` if set.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = Self::default();
        if let Some(path) = path {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            config
                .apply_json(&json)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!(path = %path.display(), "Loaded configuration file");
        } else {
            debug!("No configuration file, using built-in defaults");
        }
        Ok(config)
    }

    /// Overlay a JSON configuration document onto this config.
    pub fn apply_json(&mut self, json: &str) -> Result<()> {
        let file: ConfigFile = serde_json::from_str(json).context("Invalid configuration JSON")?;
        self.languages.merge(file.languages);
        if let Some(limits) = file.limits {
            self.limits = limits;
        }
        if file.workspace_root.is_some() {
            self.workspace_root = file.workspace_root;
        }
        Ok(())
    }

    /// Create a config from a JSON string on top of the defaults (for testing).
    #[cfg(test)]
    pub fn from_json(json: &str) -> Result<Self> {
        let mut config = Self::default();
        config.apply_json(json)?;
        Ok(config)
    }
}
