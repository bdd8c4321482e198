//! Object storage capability and the filesystem implementation.
//!
//! The production deployment fronts an S3-compatible store; the pipeline
//! only needs get/put plus presigned URLs, so that is the whole capability.
//! [`FsObjectStore`] backs the local pipeline runner and the integration
//! tests.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::constants::{PAGES_PREFIX, SLICES_PREFIX, UPLOADS_PREFIX};

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0}")]
    InvalidKey(String),
    #[error("object store io error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn put(
        &self,
        key: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<(), ObjectStoreError>;

    /// URL a client can PUT the object to without credentials, valid for
    /// `ttl`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError>;

    /// URL a client can GET the object from without credentials, valid for
    /// `ttl`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError>;
}

/// Key for a raw user upload: `uploads/<batchId>/<filename>`.
pub fn upload_key(batch_id: &str, filename: &str) -> String {
    format!("{UPLOADS_PREFIX}/{batch_id}/{filename}")
}

/// Key for a normalized page image: `pages/<batchId>/page_<NNNN>.<ext>`.
pub fn page_key(batch_id: &str, page_number: u32, ext: &str) -> String {
    format!("{PAGES_PREFIX}/{batch_id}/page_{page_number:04}{ext}")
}

/// Key for an audit copy of a slice:
/// `slices/<batchId>/page_<NNNN>/slice_<III>.jpg`.
pub fn slice_key(batch_id: &str, page_number: u32, slice_index: usize) -> String {
    format!("{SLICES_PREFIX}/{batch_id}/page_{page_number:04}/slice_{slice_index:03}.jpg")
}

/// Filesystem-backed object store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        let traversal = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if traversal {
            return Err(ObjectStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(ObjectStoreError::NotFound(key.to_string()))
            }
            Err(source) => Err(ObjectStoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn put(
        &self,
        key: &str,
        _content_type: &str,
        bytes: &[u8],
    ) -> Result<(), ObjectStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ObjectStoreError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| ObjectStoreError::Io {
                key: key.to_string(),
                source,
            })
    }

    async fn presign_put(
        &self,
        key: &str,
        _content_type: &str,
        ttl: Duration,
    ) -> Result<String, ObjectStoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ObjectStoreError::Io {
                    key: key.to_string(),
                    source,
                })?;
        }
        Ok(format!("file://{}?expires={}", path.display(), ttl.as_secs()))
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, ObjectStoreError> {
        let path = self.resolve(key)?;
        Ok(format!("file://{}?expires={}", path.display(), ttl.as_secs()))
    }
}
