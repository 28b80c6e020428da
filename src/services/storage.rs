//! Public file storage for photos, signatures, and generated PDFs.
//!
//! Files are addressed by paths relative to the storage root; those relative
//! paths are what gets persisted in the database and what the `/storage`
//! route serves.

use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::errors::AppError;

pub const PHOTOS_DIR: &str = "photos";
pub const SIGNATURES_DIR: &str = "signatures";
pub const PDFS_DIR: &str = "pdfs";

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    public_url: String,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>, public_url: &str) -> Self {
        Self {
            root: root.into(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root and the well-known subdirectories.
    pub async fn ensure_layout(&self) -> Result<(), AppError> {
        for dir in [PHOTOS_DIR, SIGNATURES_DIR, PDFS_DIR] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    /// Write `data` under `dir` with a fresh time-ordered name and return its relative path.
    pub async fn put(&self, dir: &str, extension: &str, data: &[u8]) -> Result<String, AppError> {
        let relative = format!("{dir}/{}.{extension}", Uuid::now_v7());
        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(relative)
    }

    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, AppError> {
        let path = self.resolve(relative)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::NotFound(format!("Stored file '{relative}' not found")))
            }
            Err(e) => Err(AppError::Storage(e)),
        }
    }

    /// Remove a stored file. Missing files are not an error.
    pub async fn delete(&self, relative: &str) -> Result<(), AppError> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(e)),
        }
    }

    /// Map a relative path to an absolute one, refusing anything that leaves the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, AppError> {
        let rel = Path::new(relative);
        let escapes = relative.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(AppError::Validation(format!(
                "Invalid storage path '{relative}'"
            )));
        }
        Ok(self.root.join(rel))
    }

    pub fn public_url(&self, relative: &str) -> String {
        format!("{}/{relative}", self.public_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path(), "/storage/");
        storage.ensure_layout().await.unwrap();

        let rel = storage.put(PHOTOS_DIR, "png", b"image-bytes").await.unwrap();
        assert!(rel.starts_with("photos/"));
        assert!(rel.ends_with(".png"));
        assert_eq!(storage.read(&rel).await.unwrap(), b"image-bytes");
        assert_eq!(storage.public_url(&rel), format!("/storage/{rel}"));

        storage.delete(&rel).await.unwrap();
        assert!(storage.read(&rel).await.unwrap_err().is_not_found());
        // Second delete is a no-op.
        tokio_test::assert_ok!(storage.delete(&rel).await);
    }

    #[test]
    fn resolve_rejects_escapes() {
        let storage = FileStorage::new("/srv/storage", "/storage");
        assert!(storage.resolve("../etc/passwd").is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("photos/../../x").is_err());
        assert!(storage.resolve("").is_err());
        assert_eq!(
            storage.resolve("pdfs/a.pdf").unwrap(),
            PathBuf::from("/srv/storage/pdfs/a.pdf")
        );
    }
}
