//! Local-filesystem storage backend.
//!
//! Media folders are plain directories; "upload" is a copy. Used for
//! single-host deployments and as the fetch-free fast path in tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use glob::glob;

use crate::domain::{MediaItem, MediaKind};

use super::{Storage, StorageError};

/// Storage backend rooted at a base directory.
pub struct LocalStorage {
    base: PathBuf,
}

impl LocalStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn absolute(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base.join(p)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(
        &self,
        folder: &str,
        kind: MediaKind,
        extensions: &[&str],
    ) -> Result<Vec<MediaItem>, StorageError> {
        let dir = self.absolute(folder);
        if !dir.is_dir() {
            return Err(StorageError::NotFound(dir.display().to_string()));
        }

        let mut items = Vec::new();
        for ext in extensions {
            let pattern = dir.join(format!("*.{ext}"));
            let matches = glob(&pattern.to_string_lossy())
                .map_err(|e| StorageError::Transport(e.to_string()))?;
            for entry in matches {
                let path = entry.map_err(|e| StorageError::Transport(e.to_string()))?;
                items.push(MediaItem::new(path, kind));
            }
        }
        Ok(items)
    }

    async fn fetch(&self, item: &MediaItem, _dest_dir: &Path) -> Result<PathBuf, StorageError> {
        // Already local; hand back the source path instead of copying.
        let path = self.absolute(&item.path.to_string_lossy());
        if !path.is_file() {
            return Err(StorageError::NotFound(path.display().to_string()));
        }
        Ok(path)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError> {
        let dest = self.absolute(remote);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, &dest).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.absolute(path).exists())
    }
}
