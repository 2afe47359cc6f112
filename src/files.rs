//! Durable storage for uploaded source files.
//!
//! Each upload lands in its own id-named subdirectory, which also becomes the
//! working directory the profiler strategies write their artifacts into.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Content store rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist `content` as `<root>/<uuid>/<file_name>` and return the path.
    ///
    /// The file is flushed and synced before returning, so a caller may treat
    /// the returned path as durably written.
    pub async fn save(&self, file_name: &str, content: &[u8]) -> std::io::Result<PathBuf> {
        let dir = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(file_name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await?;

        tracing::debug!(path = %path.display(), bytes = content.len(), "File persisted");
        Ok(path)
    }

    /// Remove a previously saved file together with its upload directory.
    pub async fn remove(&self, path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(dir) if dir.starts_with(&self.root) && dir != self.root => {
                tokio::fs::remove_dir_all(dir).await
            }
            _ => tokio::fs::remove_file(path).await,
        }
    }
}
