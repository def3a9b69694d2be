//! Coordinated delete and move
//!
//! Both run while holding a [`FileCoordinator`] guard on every path they
//! touch, so no other coordinated access to an overlapping path runs
//! concurrently.

use crate::error::{DocumentError, Result};
use bridge_traits::{FileCoordinator, UbiquityFileSystem};
use core_runtime::logging::strip_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct CoordinatedFileAccess {
    file_system: Arc<dyn UbiquityFileSystem>,
    coordinator: Arc<dyn FileCoordinator>,
}

impl CoordinatedFileAccess {
    pub fn new(
        file_system: Arc<dyn UbiquityFileSystem>,
        coordinator: Arc<dyn FileCoordinator>,
    ) -> Self {
        Self {
            file_system,
            coordinator,
        }
    }

    /// Remove the item at `path`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::FileNotFound`] without touching anything when the
    /// item does not exist.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        let _guard = self.coordinator.coordinate(&[path.to_path_buf()]).await?;

        if !self.file_system.exists(path).await? {
            return Err(DocumentError::FileNotFound {
                path: display_name(path),
            });
        }

        self.file_system.remove_item(path).await?;
        debug!(file = %display_name(path), "Deleted item");
        Ok(())
    }

    /// Move the item at `from` to `to`, creating missing parents of `to`.
    ///
    /// Parents created here are removed again when the move fails.
    pub async fn move_item(&self, from: &Path, to: &Path) -> Result<()> {
        let _guard = self
            .coordinator
            .coordinate(&[from.to_path_buf(), to.to_path_buf()])
            .await?;

        if !self.file_system.exists(from).await? {
            return Err(DocumentError::NativeIo(format!(
                "\"{}\" couldn't be moved because it doesn't exist",
                display_name(from)
            )));
        }

        let created = match to.parent() {
            Some(parent) => self.create_parents(parent).await?,
            None => None,
        };

        if let Err(e) = self.file_system.move_item(from, to).await {
            if let Some(dir) = created {
                if let Err(cleanup) = self.file_system.remove_item(&dir).await {
                    warn!(
                        dir = %display_name(&dir),
                        error = %cleanup,
                        "Could not remove directories created for a failed move"
                    );
                }
            }
            return Err(e.into());
        }
        debug!(
            from = %display_name(from),
            to = %display_name(to),
            "Moved item"
        );
        Ok(())
    }

    /// Create `dir` and its missing ancestors.
    ///
    /// Returns the outermost directory created, `None` when `dir` existed.
    async fn create_parents(&self, dir: &Path) -> Result<Option<PathBuf>> {
        if self.file_system.exists(dir).await? {
            return Ok(None);
        }

        let mut outermost = dir;
        while let Some(up) = outermost.parent() {
            if up.as_os_str().is_empty() || self.file_system.exists(up).await? {
                break;
            }
            outermost = up;
        }

        self.file_system.create_dir_all(dir).await?;
        Ok(Some(outermost.to_path_buf()))
    }
}

fn display_name(path: &Path) -> String {
    strip_path(&path.to_string_lossy()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::{PathLockCoordinator, TokioUbiquityFileSystem};
    use crate::error::ErrorKind;

    fn access() -> CoordinatedFileAccess {
        CoordinatedFileAccess::new(
            Arc::new(TokioUbiquityFileSystem::new()),
            Arc::new(PathLockCoordinator::new()),
        )
    }

    #[tokio::test]
    async fn test_delete_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.txt");
        let sibling = dir.path().join("b.txt");
        std::fs::write(&target, b"a").unwrap();
        std::fs::write(&sibling, b"b").unwrap();

        access().delete(&target).await.unwrap();

        assert!(!target.exists());
        assert!(sibling.exists());
    }

    #[tokio::test]
    async fn test_delete_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let sibling = dir.path().join("b.txt");
        std::fs::write(&sibling, b"b").unwrap();

        let result = access().delete(&dir.path().join("missing.txt")).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::FileNotFound);
        assert!(sibling.exists());
    }

    #[tokio::test]
    async fn test_move_creates_parent_chain() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("x/y/z/a.txt");
        std::fs::write(&from, b"payload").unwrap();

        access().move_item(&from, &to).await.unwrap();

        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_failed_move_removes_created_parents() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("album");
        std::fs::create_dir(&from).unwrap();
        std::fs::write(from.join("a.txt"), b"a").unwrap();

        // A directory cannot be moved into its own subtree.
        let to = from.join("x/y/album");
        let result = access().move_item(&from, &to).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NativeIo);
        assert!(!from.join("x").exists());
        assert_eq!(std::fs::read(from.join("a.txt")).unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_failed_move_keeps_existing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let existing = dir.path().join("docs");
        std::fs::write(&from, b"a").unwrap();
        std::fs::create_dir(&existing).unwrap();
        std::fs::write(existing.join("a.txt"), b"taken").unwrap();

        let result = access().move_item(&from, &existing.join("a.txt")).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NativeIo);
        assert!(from.exists());
        assert_eq!(std::fs::read(existing.join("a.txt")).unwrap(), b"taken");
    }

    #[tokio::test]
    async fn test_move_missing_source_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let to = dir.path().join("x/a.txt");

        let result = access()
            .move_item(&dir.path().join("missing.txt"), &to)
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NativeIo);
        assert!(!dir.path().join("x").exists());
    }
}
