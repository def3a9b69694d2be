//! # Metadata Query Adapter
//!
//! Turns the platform's live metadata query into typed snapshots scoped to
//! one container.
//!
//! ## Overview
//!
//! A [`QueryHandle`] yields one [`QueryEvent`] per platform notification:
//! first [`QueryEventKind::FinishGathering`] once the initial scan is done,
//! then [`QueryEventKind::Update`] whenever the result set changes. Each event
//! carries the full result set as [`TrackedItem`]s:
//!
//! - directories (paths ending with a separator) are dropped
//! - items without a path, or outside the container root, are dropped
//! - an item whose status attributes cannot all be read has no
//!   [`FileStatusRecord`]; it still exposes its transfer progress and errors
//!
//! Every dropped or partial item is logged at `trace` level.

use crate::error::Result;
use crate::record::{DownloadStatus, FileStatusRecord};
use bridge_traits::ubiquity::{
    LiveQuery, MetadataQueryService, QueryItem, QueryNotification, QueryScope,
};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;
use tracing::{debug, trace};

/// Which items of a container a query observes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryPredicate {
    /// Every item below the container root
    Container,
    /// Exactly one absolute path (0 or 1 results)
    Item(PathBuf),
}

impl From<QueryPredicate> for QueryScope {
    fn from(predicate: QueryPredicate) -> Self {
        match predicate {
            QueryPredicate::Container => QueryScope::Container,
            QueryPredicate::Item(path) => QueryScope::Item(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryEventKind {
    FinishGathering,
    Update,
}

/// One file reported by a query
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedItem {
    /// Absolute path of the file
    pub path: PathBuf,
    /// Full status, when every attribute was readable
    pub record: Option<FileStatusRecord>,
    pub download_status: Option<DownloadStatus>,
    pub percent_downloaded: Option<f64>,
    pub percent_uploaded: Option<f64>,
    pub downloading_error: Option<String>,
    pub uploading_error: Option<String>,
}

impl TrackedItem {
    pub fn is_upload_complete(&self) -> bool {
        self.percent_uploaded.is_some_and(|percent| percent >= 100.0)
    }

    pub fn is_download_complete(&self) -> bool {
        self.download_status == Some(DownloadStatus::Current)
    }
}

/// A snapshot of the query's result set
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvent {
    pub kind: QueryEventKind,
    pub items: Vec<TrackedItem>,
}

impl QueryEvent {
    /// Complete status records, in query order
    pub fn records(&self) -> Vec<FileStatusRecord> {
        self.items
            .iter()
            .filter_map(|item| item.record.clone())
            .collect()
    }
}

/// Opens live queries through the platform bridge
#[derive(Clone)]
pub struct MetadataQueryAdapter {
    service: Arc<dyn MetadataQueryService>,
}

impl MetadataQueryAdapter {
    pub fn new(service: Arc<dyn MetadataQueryService>) -> Self {
        Self { service }
    }

    /// Start observing `root` restricted to `predicate`
    pub async fn open(&self, root: &Path, predicate: QueryPredicate) -> Result<QueryHandle> {
        let query = self.service.start_query(root, predicate.into()).await?;
        debug!("Metadata query started");
        Ok(QueryHandle::new(root, query))
    }
}

/// Live subscription to one metadata query
///
/// Stopping is idempotent and also happens on drop.
#[derive(Debug)]
pub struct QueryHandle {
    query: LiveQuery,
    root_prefix: String,
}

impl QueryHandle {
    pub fn new(root: &Path, query: LiveQuery) -> Self {
        Self {
            query,
            root_prefix: root_prefix(root),
        }
    }

    /// Wait for the next snapshot; `None` once stopped
    pub async fn next(&mut self) -> Option<QueryEvent> {
        let notification = self.query.next().await?;
        let (kind, items) = match notification {
            QueryNotification::FinishGathering(items) => (QueryEventKind::FinishGathering, items),
            QueryNotification::Update(items) => (QueryEventKind::Update, items),
        };

        let items = items
            .into_iter()
            .filter_map(|item| track_item(&self.root_prefix, item))
            .collect();

        Some(QueryEvent { kind, items })
    }

    pub fn stop(&mut self) {
        if !self.query.is_stopped() {
            debug!("Metadata query stopped");
        }
        self.query.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.query.is_stopped()
    }
}

/// Root path plus exactly one trailing separator
fn root_prefix(root: &Path) -> String {
    let root = root.to_string_lossy();
    if root.ends_with(MAIN_SEPARATOR) {
        root.into_owned()
    } else {
        format!("{}{}", root, MAIN_SEPARATOR)
    }
}

fn is_directory(path: &str) -> bool {
    path.ends_with(MAIN_SEPARATOR) || path.ends_with('/')
}

fn track_item(root_prefix: &str, item: QueryItem) -> Option<TrackedItem> {
    let Some(path) = item.path.as_deref() else {
        trace!("Skipping query item without a path");
        return None;
    };

    if is_directory(path) {
        return None;
    }

    let Some(relative_path) = path.strip_prefix(root_prefix) else {
        trace!("Skipping query item outside the container root");
        return None;
    };

    let download_status = item
        .downloading_status
        .as_deref()
        .and_then(DownloadStatus::from_platform);
    let record = status_record(relative_path, &item, download_status);
    if record.is_none() {
        trace!("Query item has unreadable status attributes");
    }

    Some(TrackedItem {
        path: PathBuf::from(path),
        record,
        download_status,
        percent_downloaded: item.percent_downloaded,
        percent_uploaded: item.percent_uploaded,
        downloading_error: item.downloading_error,
        uploading_error: item.uploading_error,
    })
}

fn status_record(
    relative_path: &str,
    item: &QueryItem,
    download_status: Option<DownloadStatus>,
) -> Option<FileStatusRecord> {
    Some(FileStatusRecord {
        relative_path: relative_path.to_string(),
        size_in_bytes: item.size?,
        creation_date: item.creation_date?,
        content_change_date: item.content_change_date?,
        has_unresolved_conflicts: item.has_unresolved_conflicts?,
        download_status: download_status?,
        is_downloading: item.is_downloading?,
        is_uploaded: item.is_uploaded?,
        is_uploading: item.is_uploading?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ubiquity::DOWNLOADING_STATUS_CURRENT;
    use chrono::Utc;

    fn complete_item(path: &str) -> QueryItem {
        let now = Utc::now();
        QueryItem {
            path: Some(path.to_string()),
            size: Some(4),
            creation_date: Some(now),
            content_change_date: Some(now),
            has_unresolved_conflicts: Some(false),
            downloading_status: Some(DOWNLOADING_STATUS_CURRENT.to_string()),
            is_downloading: Some(false),
            is_uploaded: Some(true),
            is_uploading: Some(false),
            percent_downloaded: Some(100.0),
            percent_uploaded: Some(100.0),
            downloading_error: None,
            uploading_error: None,
        }
    }

    fn prefix() -> String {
        root_prefix(Path::new("/c"))
    }

    #[test]
    fn test_relative_path_strips_root_and_one_separator() {
        let path = format!("/c{}Documents{}a.txt", MAIN_SEPARATOR, MAIN_SEPARATOR);
        let tracked = track_item(&prefix(), complete_item(&path)).unwrap();

        assert_eq!(
            tracked.record.unwrap().relative_path,
            format!("Documents{}a.txt", MAIN_SEPARATOR)
        );
    }

    #[test]
    fn test_directories_are_dropped() {
        let path = format!("/c{}Documents{}", MAIN_SEPARATOR, MAIN_SEPARATOR);
        assert!(track_item(&prefix(), complete_item(&path)).is_none());
    }

    #[test]
    fn test_items_outside_root_are_dropped() {
        let path = format!("/other{}a.txt", MAIN_SEPARATOR);
        assert!(track_item(&prefix(), complete_item(&path)).is_none());
    }

    #[test]
    fn test_partial_item_has_no_record() {
        let path = format!("/c{}a.txt", MAIN_SEPARATOR);
        let mut item = complete_item(&path);
        item.creation_date = None;

        let tracked = track_item(&prefix(), item).unwrap();
        assert!(tracked.record.is_none());
        assert!(tracked.is_download_complete());
        assert!(tracked.is_upload_complete());
    }

    #[test]
    fn test_root_prefix_keeps_single_separator() {
        let with_sep = format!("/c{}", MAIN_SEPARATOR);
        assert_eq!(root_prefix(Path::new(&with_sep)), with_sep);
        assert_eq!(root_prefix(Path::new("/c")), with_sep);
    }

    #[tokio::test]
    async fn test_handle_maps_notifications() {
        let (publisher, query) = LiveQuery::channel();
        let mut handle = QueryHandle::new(Path::new("/c"), query);
        let file = format!("/c{}a.txt", MAIN_SEPARATOR);
        let dir = format!("/c{}docs{}", MAIN_SEPARATOR, MAIN_SEPARATOR);

        publisher.publish(QueryNotification::FinishGathering(vec![
            complete_item(&dir),
            complete_item(&file),
        ]));
        publisher.publish(QueryNotification::Update(vec![]));

        let first = handle.next().await.unwrap();
        assert_eq!(first.kind, QueryEventKind::FinishGathering);
        assert_eq!(first.records().len(), 1);

        let second = handle.next().await.unwrap();
        assert_eq!(second.kind, QueryEventKind::Update);
        assert!(second.items.is_empty());

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        assert!(publisher.is_stopped());
        assert!(handle.next().await.is_none());
    }
}
