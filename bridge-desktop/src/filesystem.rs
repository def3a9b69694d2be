//! Ubiquity File System Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    ubiquity::UbiquityFileSystem,
};
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Tokio-based ubiquity file system
///
/// On the desktop every item is local, so downloading requests only verify
/// that the item exists.
#[derive(Debug, Default, Clone)]
pub struct TokioUbiquityFileSystem;

impl TokioUbiquityFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn already_exists(path: &Path) -> BridgeError {
        BridgeError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("\"{}\" already exists", path.display()),
        ))
    }
}

#[async_trait]
impl UbiquityFileSystem for TokioUbiquityFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn remove_item(&self, path: &Path) -> Result<()> {
        let metadata = fs::symlink_metadata(path).await?;
        if metadata.is_dir() {
            fs::remove_dir_all(path).await?;
        } else {
            fs::remove_file(path).await?;
        }
        debug!(path = ?path, "Removed item");
        Ok(())
    }

    async fn copy_item(&self, from: &Path, to: &Path) -> Result<()> {
        if fs::try_exists(to).await? {
            return Err(Self::already_exists(to));
        }

        let bytes = fs::copy(from, to).await?;
        debug!(from = ?from, to = ?to, bytes, "Copied item");
        Ok(())
    }

    async fn move_item(&self, from: &Path, to: &Path) -> Result<()> {
        if fs::try_exists(to).await? {
            return Err(Self::already_exists(to));
        }

        fs::rename(from, to).await?;
        debug!(from = ?from, to = ?to, "Moved item");
        Ok(())
    }

    async fn start_downloading(&self, path: &Path) -> Result<()> {
        if !fs::try_exists(path).await? {
            return Err(BridgeError::NotFound(path.display().to_string()));
        }
        debug!(path = ?path, "Item already local");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"old").unwrap();

        let fs = TokioUbiquityFileSystem::new();
        let err = fs.copy_item(&from, &to).await.unwrap_err();

        assert!(matches!(err, BridgeError::Io(e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(std::fs::read(&to).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_remove_item_handles_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("folder");
        std::fs::create_dir_all(nested.join("inner")).unwrap();
        std::fs::write(nested.join("inner/file.txt"), b"x").unwrap();

        let fs = TokioUbiquityFileSystem::new();
        fs.remove_item(&nested).await.unwrap();

        assert!(!nested.exists());
    }

    #[tokio::test]
    async fn test_move_item() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("b.txt");
        std::fs::write(&from, b"content").unwrap();

        let fs = TokioUbiquityFileSystem::new();
        fs.move_item(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_start_downloading_missing_item() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioUbiquityFileSystem::new();

        let err = fs
            .start_downloading(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
    }
}
