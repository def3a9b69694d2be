//! Ubiquity Container Abstractions
//!
//! Platform-agnostic traits for the cloud-synchronised file namespace:
//! - Resolving a container identifier to its root directory
//! - File operations inside (and out of) the container
//! - Live metadata queries reporting per-item sync attributes
//! - Coordinated (mutually exclusive) file access
//!
//! On Apple platforms these map onto `FileManager`, `NSMetadataQuery` and
//! `NSFileCoordinator`. The desktop implementations in `bridge-desktop` back
//! a container with a plain directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::Result;

/// Raw downloading status reported for an item that is not present locally.
pub const DOWNLOADING_STATUS_NOT_DOWNLOADED: &str =
    "NSMetadataUbiquitousItemDownloadingStatusNotDownloaded";

/// Raw downloading status for a local copy that may be stale.
pub const DOWNLOADING_STATUS_DOWNLOADED: &str =
    "NSMetadataUbiquitousItemDownloadingStatusDownloaded";

/// Raw downloading status for an up-to-date local copy.
pub const DOWNLOADING_STATUS_CURRENT: &str = "NSMetadataUbiquitousItemDownloadingStatusCurrent";

/// Resolves container identifiers to container roots
///
/// Resolution happens on every operation and must not be cached by callers:
/// the user may sign out or revoke the iCloud permission at any time.
#[async_trait]
pub trait UbiquityContainers: Send + Sync {
    /// Resolve a container identifier to the container's root directory.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the container is unavailable (unknown identifier,
    /// signed-out user, disabled permission).
    async fn container_url(&self, container_id: &str) -> Result<Option<PathBuf>>;
}

/// File operations on ubiquitous (cloud-backed) items
///
/// Paths are absolute. Implementations must not create parent directories
/// implicitly; callers do that explicitly through [`create_dir_all`].
///
/// [`create_dir_all`]: UbiquityFileSystem::create_dir_all
#[async_trait]
pub trait UbiquityFileSystem: Send + Sync {
    /// Check whether a file or directory exists at `path`
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all missing parents
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file or a directory tree
    async fn remove_item(&self, path: &Path) -> Result<()>;

    /// Copy the file at `from` to `to`; `to` must not exist
    async fn copy_item(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move the item at `from` to `to`
    async fn move_item(&self, from: &Path, to: &Path) -> Result<()>;

    /// Ask the platform to start downloading a ubiquitous item.
    ///
    /// This is a request; completion is observed through a metadata query.
    async fn start_downloading(&self, path: &Path) -> Result<()>;
}

/// Predicate of a live metadata query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// Every item whose path starts with the container root
    Container,
    /// The single item whose path equals this absolute path
    Item(PathBuf),
}

/// Raw attributes of one query result
///
/// Every attribute is optional because the platform may fail to read any of
/// them. Directory paths end with a separator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryItem {
    pub path: Option<String>,
    pub size: Option<u64>,
    pub creation_date: Option<DateTime<Utc>>,
    pub content_change_date: Option<DateTime<Utc>>,
    pub has_unresolved_conflicts: Option<bool>,
    /// One of the `DOWNLOADING_STATUS_*` constants
    pub downloading_status: Option<String>,
    pub is_downloading: Option<bool>,
    pub is_uploaded: Option<bool>,
    pub is_uploading: Option<bool>,
    pub percent_downloaded: Option<f64>,
    pub percent_uploaded: Option<f64>,
    pub downloading_error: Option<String>,
    pub uploading_error: Option<String>,
}

/// Notification delivered by a live query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNotification {
    /// The initial scan completed; carries the full result set
    FinishGathering(Vec<QueryItem>),
    /// The result set changed; carries the full, updated result set
    Update(Vec<QueryItem>),
}

/// Consumer side of a running metadata query
///
/// Notifications arrive in the order the platform reports them. Stopping is
/// idempotent and also happens on drop, which tells the producer to release
/// the platform query.
#[derive(Debug)]
pub struct LiveQuery {
    notifications: mpsc::UnboundedReceiver<QueryNotification>,
    stop: CancellationToken,
}

/// Producer side of a running metadata query
#[derive(Debug, Clone)]
pub struct QueryPublisher {
    sender: mpsc::UnboundedSender<QueryNotification>,
    stop: CancellationToken,
}

impl LiveQuery {
    /// Create a connected publisher/consumer pair
    pub fn channel() -> (QueryPublisher, LiveQuery) {
        let (sender, notifications) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        (
            QueryPublisher {
                sender,
                stop: stop.clone(),
            },
            LiveQuery { notifications, stop },
        )
    }

    /// Wait for the next notification.
    ///
    /// Returns `None` once the query is stopped or the producer went away.
    pub async fn next(&mut self) -> Option<QueryNotification> {
        if self.stop.is_cancelled() {
            return None;
        }
        self.notifications.recv().await
    }

    /// Stop the query and drop any pending notifications
    pub fn stop(&mut self) {
        self.stop.cancel();
        self.notifications.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

impl QueryPublisher {
    /// Deliver a notification. Returns `false` once the consumer stopped.
    pub fn publish(&self, notification: QueryNotification) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        self.sender.send(notification).is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves when the consumer stops the query
    pub fn stopped(&self) -> WaitForCancellationFuture<'_> {
        self.stop.cancelled()
    }
}

/// Live metadata query service
///
/// # Example
///
/// ```ignore
/// use bridge_traits::ubiquity::{MetadataQueryService, QueryScope};
///
/// async fn watch(service: &dyn MetadataQueryService, root: &Path) -> Result<()> {
///     let mut query = service.start_query(root, QueryScope::Container).await?;
///     while let Some(notification) = query.next().await {
///         println!("{:?}", notification);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MetadataQueryService: Send + Sync {
    /// Start a live query over `root` restricted by `scope`.
    ///
    /// The first notification is always [`QueryNotification::FinishGathering`].
    async fn start_query(&self, root: &Path, scope: QueryScope) -> Result<LiveQuery>;
}

/// Held for the duration of a coordinated file access
///
/// Releasing happens on drop.
pub struct CoordinationGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl CoordinationGuard {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard for platforms that coordinate inside the file operations themselves
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for CoordinationGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for CoordinationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationGuard")
            .field("held", &self.release.is_some())
            .finish()
    }
}

/// Coordinated file access
///
/// While a guard is held, no other coordinated access on an overlapping path
/// (equal, ancestor or descendant) may be granted.
#[async_trait]
pub trait FileCoordinator: Send + Sync {
    /// Wait until all `paths` can be accessed exclusively
    async fn coordinate(&self, paths: &[PathBuf]) -> Result<CoordinationGuard>;
}
