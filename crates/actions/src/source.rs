//! Where action definitions come from.
//!
//! An [`ActionSource`] lists definition documents and returns their raw
//! bytes; [`load_actions`] parses and validates them. The order in which a
//! source lists its documents is the order actions are matched and executed.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::action::{parse_action, Action};
use strata_core::error::CoreError;

/// File extensions recognised as action definitions.
const DEFINITION_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Errors raised while loading action definitions.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to read action source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Action definition '{0}' not found")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Provider of raw action definition documents.
#[async_trait]
pub trait ActionSource: Send + Sync {
    /// Names of the available definitions, in load order.
    async fn list(&self) -> Result<Vec<String>, SourceError>;

    /// Raw content of one definition.
    async fn load(&self, name: &str) -> Result<Vec<u8>, SourceError>;
}

/// Load, parse, and validate every definition of `source`.
///
/// Any invalid document fails the whole load.
pub async fn load_actions(source: &dyn ActionSource) -> Result<Vec<Arc<Action>>, SourceError> {
    let names = source.list().await?;
    let mut actions = Vec::with_capacity(names.len());
    for name in names {
        let data = source.load(&name).await?;
        let action = parse_action(&name, &data)?;
        actions.push(Arc::new(action));
    }
    Ok(actions)
}

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Reads `*.yaml` / `*.yml` files from a directory, sorted by file name.
///
/// A missing directory yields no actions.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ActionSource for DirectorySource {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        let io_err = |source| SourceError::Io {
            path: self.dir.display().to_string(),
            source,
        };

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            let is_definition = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| DEFINITION_EXTENSIONS.contains(&ext));
            if !is_definition || !entry.file_type().await.map_err(io_err)?.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn load(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        if name.contains('/') || name.contains('\\') || name == ".." {
            return Err(SourceError::NotFound(name.to_string()));
        }
        let path = self.dir.join(name);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SourceError::NotFound(name.to_string()))
            }
            Err(source) => Err(SourceError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticSource
// ---------------------------------------------------------------------------

/// Fixed, in-memory set of definitions.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    documents: Vec<(String, Vec<u8>)>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a definition document.
    pub fn with_action(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.documents.push((name.into(), data.into()));
        self
    }
}

#[async_trait]
impl ActionSource for StaticSource {
    async fn list(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.documents.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn load(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        self.documents
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const CHECK: &str = "\
name: check
on:
  pre-commit: {}
hooks:
  - id: h1
    type: webhook
    properties:
      url: http://localhost/check
";

    const NOTIFY: &str = "\
name: notify
on:
  post-commit:
    branches: [main]
hooks:
  - id: n1
    type: shell
    properties:
      script_path: notify.sh
";

    #[tokio::test]
    async fn static_source_preserves_order() {
        let source = StaticSource::new()
            .with_action("b.yaml", NOTIFY)
            .with_action("a.yaml", CHECK);
        let actions = load_actions(&source).await.unwrap();
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["notify", "check"]);
    }

    #[tokio::test]
    async fn invalid_document_fails_load() {
        let source = StaticSource::new().with_action("bad.yaml", "name: bad\non: {}\nhooks: []\n");
        assert_matches!(load_actions(&source).await, Err(SourceError::Invalid(_)));
    }

    #[tokio::test]
    async fn directory_source_lists_sorted_yaml_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yml"), NOTIFY).unwrap();
        std::fs::write(dir.path().join("a.yaml"), CHECK).unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();
        std::fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.list().await.unwrap(), vec!["a.yaml", "b.yml"]);

        let actions = load_actions(&source).await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "check");
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path().join("does-not-exist"));
        assert!(load_actions(&source).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_load_rejects_path_names() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        assert_matches!(source.load("../x.yaml").await, Err(SourceError::NotFound(_)));
        assert_matches!(source.load("nope.yaml").await, Err(SourceError::NotFound(_)));
    }
}
