//! In-process file coordination
//!
//! Grants exclusive access to a set of paths. Two requests conflict when any
//! of their paths are equal or one contains the other.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    ubiquity::{CoordinationGuard, FileCoordinator},
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing::trace;

#[derive(Default)]
struct CoordinatorState {
    active: Mutex<Vec<PathBuf>>,
    released: Notify,
}

/// Path-level mutual exclusion within one process
#[derive(Default, Clone)]
pub struct PathLockCoordinator {
    state: Arc<CoordinatorState>,
}

impl PathLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn overlaps(a: &Path, b: &Path) -> bool {
        a.starts_with(b) || b.starts_with(a)
    }

    fn try_acquire(&self, paths: &[PathBuf]) -> Result<bool> {
        let mut active = self
            .state
            .active
            .lock()
            .map_err(|_| BridgeError::OperationFailed("Coordinator state poisoned".to_string()))?;

        let blocked = paths
            .iter()
            .any(|p| active.iter().any(|held| Self::overlaps(p, held)));
        if blocked {
            return Ok(false);
        }

        active.extend(paths.iter().cloned());
        Ok(true)
    }

    fn guard(&self, paths: Vec<PathBuf>) -> CoordinationGuard {
        let state = Arc::clone(&self.state);
        CoordinationGuard::new(move || {
            if let Ok(mut active) = state.active.lock() {
                for path in &paths {
                    if let Some(index) = active.iter().position(|held| held == path) {
                        active.swap_remove(index);
                    }
                }
            }
            state.released.notify_waiters();
        })
    }
}

#[async_trait]
impl FileCoordinator for PathLockCoordinator {
    async fn coordinate(&self, paths: &[PathBuf]) -> Result<CoordinationGuard> {
        loop {
            let released = self.state.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if self.try_acquire(paths)? {
                trace!(paths = ?paths, "Coordinated access granted");
                return Ok(self.guard(paths.to_vec()));
            }

            trace!(paths = ?paths, "Waiting for coordinated access");
            released.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_overlap_rules() {
        let a = Path::new("/c/docs");
        assert!(PathLockCoordinator::overlaps(a, Path::new("/c/docs")));
        assert!(PathLockCoordinator::overlaps(a, Path::new("/c/docs/a.txt")));
        assert!(PathLockCoordinator::overlaps(a, Path::new("/c")));
        assert!(!PathLockCoordinator::overlaps(a, Path::new("/c/docs2")));
    }

    #[tokio::test]
    async fn test_disjoint_paths_do_not_block() {
        let coordinator = PathLockCoordinator::new();
        let _a = coordinator
            .coordinate(&[PathBuf::from("/c/a.txt")])
            .await
            .unwrap();

        let b = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.coordinate(&[PathBuf::from("/c/b.txt")]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_access_waits_for_release() {
        let coordinator = PathLockCoordinator::new();
        let guard = coordinator
            .coordinate(&[PathBuf::from("/c/docs")])
            .await
            .unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            coordinator.coordinate(&[PathBuf::from("/c/docs/a.txt")]),
        )
        .await;
        assert!(blocked.is_err());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .coordinate(&[PathBuf::from("/c/docs/a.txt")])
                    .await
                    .map(|_| ())
            })
        };

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(acquired, Ok(Ok(Ok(())))));
    }
}
