use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Resolves logical script paths to their raw bytes.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn resolve(&self, path: &str) -> Result<Vec<u8>, ResourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("Resource {path} not found")]
    NotFound { path: String },

    #[error("Failed to read resource {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Loads resources from files below a root directory.
///
/// Paths are always relative to the root: a leading `/` is ignored and
/// paths that would leave the root resolve to [`ResourceError::NotFound`].
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));

        let contained = relative.components().all(|component| {
            matches!(component, Component::Normal(_) | Component::CurDir)
        });

        (contained && !path.trim_start_matches('/').is_empty())
            .then(|| self.root.join(relative))
    }
}

#[async_trait]
impl ResourceLoader for DirectoryLoader {
    async fn resolve(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        let not_found = || ResourceError::NotFound { path: path.to_string() };

        let file = self.locate(path).ok_or_else(not_found)?;

        match tokio::fs::read(&file).await {
            Ok(bytes) => {
                debug!(path, file = %file.display(), "Resolved resource");
                Ok(bytes)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(not_found())
            }
            Err(source) => {
                Err(ResourceError::Io { path: path.to_string(), source })
            }
        }
    }
}

/// Serves resources from memory, for scripts embedded in the binary.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    resources: HashMap<String, Vec<u8>>,
}

impl StaticLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        path: impl AsRef<str>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<str>, contents: impl Into<Vec<u8>>) {
        self.resources.insert(normalize(path.as_ref()), contents.into());
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[async_trait]
impl ResourceLoader for StaticLoader {
    async fn resolve(&self, path: &str) -> Result<Vec<u8>, ResourceError> {
        self.resources
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| ResourceError::NotFound { path: path.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_directory_loader_reads_relative_and_rooted_paths() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sql")).unwrap();
        std::fs::write(dir.path().join("sql/users.sql"), b"SELECT 1;").unwrap();

        let loader = DirectoryLoader::new(dir.path());

        assert_eq!(loader.resolve("sql/users.sql").await.unwrap(), b"SELECT 1;");
        assert_eq!(loader.resolve("/sql/users.sql").await.unwrap(), b"SELECT 1;");
    }

    #[tokio::test]
    async fn test_directory_loader_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let loader = DirectoryLoader::new(dir.path());

        let err = loader.resolve("/missing.sql").await.unwrap_err();

        assert!(
            matches!(err, ResourceError::NotFound { ref path } if path == "/missing.sql")
        );
    }

    #[tokio::test]
    async fn test_directory_loader_refuses_to_leave_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("scripts");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(dir.path().join("secret.sql"), b"DROP TABLE x;").unwrap();

        let loader = DirectoryLoader::new(&root);

        for path in ["../secret.sql", "/../secret.sql", "", "/"] {
            let err = loader.resolve(path).await.unwrap_err();
            assert!(
                matches!(err, ResourceError::NotFound { .. }),
                "{path:?} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_directory_loader_reports_io_errors() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("folder.sql")).unwrap();

        let loader = DirectoryLoader::new(dir.path());
        let err = loader.resolve("folder.sql").await.unwrap_err();

        assert!(matches!(err, ResourceError::Io { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_static_loader_ignores_leading_slash() {
        let loader = StaticLoader::new().with("/seed.sql", "SELECT 1;");

        assert_eq!(loader.resolve("seed.sql").await.unwrap(), b"SELECT 1;");
        assert_eq!(loader.resolve("/seed.sql").await.unwrap(), b"SELECT 1;");
        assert!(matches!(
            loader.resolve("other.sql").await,
            Err(ResourceError::NotFound { .. })
        ));
    }
}
