//! Per-execution scratch directory
//!
//! Holds the bootstrap, the user source and the guard channel socket. The
//! child runs with this directory as its working directory and HOME; it is
//! removed when the workspace is dropped.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, instrument};

use crate::guard::BOOTSTRAP;

pub const BOOTSTRAP_NAME: &str = "bootstrap.py";
pub const SOURCE_NAME: &str = "main.py";
pub const CHANNEL_NAME: &str = "guard.sock";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace holding the bootstrap and `code`
    #[instrument(skip(code))]
    pub async fn create(code: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("guardbox-").tempdir()?;
        let workspace = Self { dir };
        workspace.write_file(BOOTSTRAP_NAME, BOOTSTRAP.as_bytes()).await?;
        workspace.write_file(SOURCE_NAME, code.as_bytes()).await?;
        debug!(path = %workspace.path().display(), "workspace created");
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the path of a file inside the workspace
    pub fn file_path(&self, name: &str) -> io::Result<PathBuf> {
        // Reject path traversal attempts
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path traversal not allowed: {name}"),
            ));
        }
        Ok(self.dir.path().join(name))
    }

    /// Write a file into the workspace
    pub async fn write_file(&self, name: &str, content: &[u8]) -> io::Result<()> {
        let path = self.file_path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    pub fn bootstrap_path(&self) -> PathBuf {
        self.dir.path().join(BOOTSTRAP_NAME)
    }

    pub fn source_path(&self) -> PathBuf {
        self.dir.path().join(SOURCE_NAME)
    }

    pub fn channel_path(&self) -> PathBuf {
        self.dir.path().join(CHANNEL_NAME)
    }
}
