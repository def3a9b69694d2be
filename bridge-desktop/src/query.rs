//! Polling metadata query
//!
//! Desktop stand-in for `NSMetadataQuery`: rescans the container on a fixed
//! interval and publishes the result set whenever it changes. Local files
//! are always fully uploaded and current.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    ubiquity::{
        LiveQuery, MetadataQueryService, QueryItem, QueryNotification, QueryPublisher, QueryScope,
        DOWNLOADING_STATUS_CURRENT,
    },
};
use chrono::{DateTime, Utc};
use std::fs::Metadata;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, trace};

/// Default rescan interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Metadata query service that polls the file system
#[derive(Debug, Clone)]
pub struct PollingMetadataQuery {
    poll_interval: Duration,
}

impl PollingMetadataQuery {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for PollingMetadataQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataQueryService for PollingMetadataQuery {
    async fn start_query(&self, root: &Path, scope: QueryScope) -> Result<LiveQuery> {
        let (publisher, query) = LiveQuery::channel();
        let root = root.to_path_buf();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            run_query(root, scope, publisher, poll_interval).await;
        });

        Ok(query)
    }
}

async fn run_query(
    root: PathBuf,
    scope: QueryScope,
    publisher: QueryPublisher,
    poll_interval: Duration,
) {
    let mut previous = scan(&root, &scope).await;
    debug!(items = previous.len(), "Metadata query finished gathering");
    if !publisher.publish(QueryNotification::FinishGathering(previous.clone())) {
        return;
    }

    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = publisher.stopped() => break,
            _ = ticker.tick() => {
                let items = scan(&root, &scope).await;
                if items == previous {
                    continue;
                }
                if !publisher.publish(QueryNotification::Update(items.clone())) {
                    break;
                }
                previous = items;
            }
        }
    }

    debug!("Metadata query stopped");
}

async fn scan(root: &Path, scope: &QueryScope) -> Vec<QueryItem> {
    match scope {
        QueryScope::Item(path) => match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() => vec![file_item(path, &metadata)],
            _ => Vec::new(),
        },
        QueryScope::Container => {
            let mut items = Vec::new();
            let mut pending = vec![root.to_path_buf()];

            while let Some(dir) = pending.pop() {
                let mut entries = match fs::read_dir(&dir).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        trace!(path = ?dir, error = %e, "Skipping unreadable directory");
                        continue;
                    }
                };

                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    let Ok(metadata) = entry.metadata().await else {
                        continue;
                    };

                    if metadata.is_dir() {
                        items.push(directory_item(&path));
                        pending.push(path);
                    } else if metadata.is_file() {
                        items.push(file_item(&path, &metadata));
                    }
                }
            }

            items.sort_by(|a, b| a.path.cmp(&b.path));
            items
        }
    }
}

fn file_item(path: &Path, metadata: &Metadata) -> QueryItem {
    let modified = metadata.modified().ok().map(DateTime::<Utc>::from);
    let created = metadata
        .created()
        .ok()
        .map(DateTime::<Utc>::from)
        .or(modified);

    QueryItem {
        path: Some(path.to_string_lossy().into_owned()),
        size: Some(metadata.len()),
        creation_date: created,
        content_change_date: modified,
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

fn directory_item(path: &Path) -> QueryItem {
    QueryItem {
        path: Some(format!("{}{}", path.to_string_lossy(), MAIN_SEPARATOR)),
        ..QueryItem::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_container_scan_marks_directories() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("docs")).unwrap();
        std::fs::write(root.path().join("docs/a.txt"), b"a").unwrap();

        let items = scan(root.path(), &QueryScope::Container).await;
        let paths: Vec<_> = items.iter().filter_map(|i| i.path.clone()).collect();

        assert_eq!(paths.len(), 2);
        assert!(paths
            .iter()
            .any(|p| p.ends_with(MAIN_SEPARATOR) && p.contains("docs")));
        assert!(paths.iter().any(|p| p.ends_with("a.txt")));
    }

    #[tokio::test]
    async fn test_item_scope_without_match_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let items = scan(
            root.path(),
            &QueryScope::Item(root.path().join("missing.txt")),
        )
        .await;

        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_query_publishes_finish_then_updates() {
        let root = tempfile::tempdir().unwrap();
        let service = PollingMetadataQuery::with_poll_interval(Duration::from_millis(20));
        let mut query = service
            .start_query(root.path(), QueryScope::Container)
            .await
            .unwrap();

        assert_eq!(
            query.next().await,
            Some(QueryNotification::FinishGathering(vec![]))
        );

        std::fs::write(root.path().join("new.txt"), b"hello").unwrap();

        match query.next().await {
            Some(QueryNotification::Update(items)) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].size, Some(5));
                assert_eq!(items[0].percent_uploaded, Some(100.0));
            }
            other => panic!("unexpected notification: {:?}", other),
        }

        query.stop();
        assert_eq!(query.next().await, None);
    }
}
