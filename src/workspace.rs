//! Disposable per-invocation directories.
//!
//! A [`Workspace`] owns every file one invocation creates. Call
//! [`Workspace::release`] on the normal path; if the value is dropped
//! instead (early return, panic unwinding) the directory is still removed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::SandboxError;
use crate::language::{CommandSpec, SourceDelivery};

const PREFIX: &str = "polyrun-";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `root`, or under the
    /// system temp directory when `root` is `None`.
    pub fn acquire(root: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(SandboxError::Workspace)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(SandboxError::Workspace)?;

        debug!(path = %dir.path().display(), "Acquired workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the compiler is told to place its output.
    pub fn artifact_path(&self, spec: &CommandSpec) -> PathBuf {
        self.path().join(&spec.artifact)
    }

    /// Write the source file for languages whose toolchain needs one.
    /// Returns `None` for stdin delivery.
    pub fn write_source(
        &self,
        spec: &CommandSpec,
        source: &str,
    ) -> Result<Option<PathBuf>, SandboxError> {
        match &spec.source {
            SourceDelivery::Stdin => Ok(None),
            SourceDelivery::File { name } => {
                let path = self.path().join(name);
                std::fs::write(&path, source)
                    .map_err(|e| SandboxError::io("Failed to write source file", e))?;
                Ok(Some(path))
            }
        }
    }

    /// Recursively delete the directory. Failures are logged, not returned.
    pub fn release(self) {
        let path = self.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "Released workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}
