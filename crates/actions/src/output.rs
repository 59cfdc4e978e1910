//! Hook output sinks.
//!
//! Hooks emit log-like output (request/response dumps, script stdout) through
//! a [`HookOutputWriter`] bound by the coordinator to one task. The writer
//! addresses the output at [`hook_output_path`] and forwards it to the
//! configured [`OutputWriter`] backend.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use strata_core::results::hook_output_path;

/// Errors raised while writing hook output.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Invalid output path '{0}'")]
    InvalidPath(String),

    #[error("Failed to write output '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Output sink unavailable")]
    Unavailable,
}

/// Backend that stores output blobs addressed by a relative path.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write_output(&self, path: &str, data: &[u8]) -> Result<(), OutputError>;
}

// ---------------------------------------------------------------------------
// HookOutputWriter
// ---------------------------------------------------------------------------

/// Output sink scoped to a single task of a run.
#[derive(Clone)]
pub struct HookOutputWriter {
    run_id: String,
    hook_run_id: String,
    action_name: String,
    hook_id: String,
    writer: Arc<dyn OutputWriter>,
}

impl HookOutputWriter {
    pub fn new(
        run_id: impl Into<String>,
        hook_run_id: impl Into<String>,
        action_name: impl Into<String>,
        hook_id: impl Into<String>,
        writer: Arc<dyn OutputWriter>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            hook_run_id: hook_run_id.into(),
            action_name: action_name.into(),
            hook_id: hook_id.into(),
            writer,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn hook_run_id(&self) -> &str {
        &self.hook_run_id
    }

    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    pub fn hook_id(&self) -> &str {
        &self.hook_id
    }

    /// Where this task's output lands.
    pub fn path(&self) -> String {
        hook_output_path(&self.run_id, &self.action_name, &self.hook_id)
    }

    /// Write the task's output, replacing anything written before.
    pub async fn write(&self, data: &[u8]) -> Result<(), OutputError> {
        self.writer.write_output(&self.path(), data).await
    }
}

impl fmt::Debug for HookOutputWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookOutputWriter")
            .field("run_id", &self.run_id)
            .field("hook_run_id", &self.hook_run_id)
            .field("action_name", &self.action_name)
            .field("hook_id", &self.hook_id)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// FsOutputWriter
// ---------------------------------------------------------------------------

/// Writes output files under a base directory.
#[derive(Debug, Clone)]
pub struct FsOutputWriter {
    base: PathBuf,
}

impl FsOutputWriter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolve a relative output path, rejecting anything that escapes `base`.
    fn resolve(&self, path: &str) -> Result<PathBuf, OutputError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(OutputError::InvalidPath(path.to_string()));
        }
        Ok(self.base.join(relative))
    }
}

#[async_trait]
impl OutputWriter for FsOutputWriter {
    async fn write_output(&self, path: &str, data: &[u8]) -> Result<(), OutputError> {
        let full = self.resolve(path)?;
        let io_err = |source| OutputError::Io {
            path: full.display().to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&full, data).await.map_err(io_err)
    }
}

// ---------------------------------------------------------------------------
// MemoryOutputWriter
// ---------------------------------------------------------------------------

/// Keeps output in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemoryOutputWriter {
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryOutputWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content written at `path`, if any.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.read().ok()?.get(path).cloned()
    }

    /// All written paths in lexicographic order.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OutputWriter for MemoryOutputWriter {
    async fn write_output(&self, path: &str, data: &[u8]) -> Result<(), OutputError> {
        let mut files = self.files.write().map_err(|_| OutputError::Unavailable)?;
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn hook_writer_uses_task_path() {
        let sink = Arc::new(MemoryOutputWriter::new());
        let writer = HookOutputWriter::new("r1", "hr1", "check", "validate", sink.clone());
        writer.write(b"hello").await.unwrap();

        assert_eq!(writer.path(), "_strata/actions/log/r1/check/validate.log");
        assert_eq!(sink.get(&writer.path()).unwrap(), b"hello");
        assert_eq!(sink.paths(), vec![writer.path()]);
    }

    #[tokio::test]
    async fn fs_writer_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsOutputWriter::new(dir.path());
        writer.write_output("a/b/c.log", b"data").await.unwrap();

        let content = std::fs::read(dir.path().join("a/b/c.log")).unwrap();
        assert_eq!(content, b"data");
    }

    #[tokio::test]
    async fn fs_writer_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsOutputWriter::new(dir.path());
        assert_matches!(
            writer.write_output("../outside.log", b"x").await,
            Err(OutputError::InvalidPath(_))
        );
        assert_matches!(
            writer.write_output("/etc/passwd", b"x").await,
            Err(OutputError::InvalidPath(_))
        );
        assert_matches!(
            writer.write_output("", b"x").await,
            Err(OutputError::InvalidPath(_))
        );
    }
}
