//! Local filesystem artifact storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::traits::storage::{ArtifactStorage, ByteStream};

/// Stores artifacts as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalArtifactStorage {
    /// Root directory for all stored artifacts.
    root: PathBuf,
}

impl LocalArtifactStorage {
    /// Create the storage, creating the root directory if needed.
    pub async fn new(root_path: &str) -> AppResult<Self> {
        let root = PathBuf::from(root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create storage root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self { root })
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key below the root, dropping any component that could escape it.
    fn resolve(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for component in Path::new(key).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }

    async fn ensure_parent(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStorage for LocalArtifactStorage {
    fn local_path(&self, key: &str) -> PathBuf {
        self.resolve(key)
    }

    async fn prepare(&self, key: &str) -> AppResult<PathBuf> {
        let full_path = self.resolve(key);
        self.ensure_parent(&full_path).await?;
        Ok(full_path)
    }

    async fn save(&self, key: &str, data: Bytes) -> AppResult<u64> {
        let full_path = self.prepare(key).await?;
        let partial = full_path.with_extension("partial");

        let mut file = fs::File::create(&partial).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to create file: {key}"), e)
        })?;
        file.write_all(&data).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to write file: {key}"), e)
        })?;
        file.flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush file", e))?;
        drop(file);

        // Readers only ever see complete artifacts.
        fs::rename(&partial, &full_path).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to store file: {key}"), e)
        })?;

        debug!(key, bytes = data.len(), "Stored artifact");
        Ok(data.len() as u64)
    }

    async fn open(&self, key: &str) -> AppResult<(ByteStream, u64)> {
        let full_path = self.resolve(key);
        let file = fs::File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Artifact not found: {key}"))
            } else {
                AppError::with_source(ErrorKind::Storage, format!("Failed to open file: {key}"), e)
            }
        })?;
        let size = file
            .metadata()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to stat file", e))?
            .len();

        Ok((Box::pin(ReaderStream::new(file)), size))
    }

    async fn remove(&self, key: &str) -> AppResult<bool> {
        let full_path = self.resolve(key);
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(key, "Removed artifact");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!(key, error = %e, "Failed to remove artifact");
                Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to delete file: {key}"),
                    e,
                ))
            }
        }
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        fs::try_exists(self.resolve(key)).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to stat file: {key}"), e)
        })
    }
}
