//! # Sync Operation Controller
//!
//! Runs gather, upload, download, delete and move requests against one
//! container at a time.
//!
//! ## Overview
//!
//! Every request becomes a [`SyncOperation`]. The container is resolved on
//! each request; an unavailable container fails that request only.
//!
//! - **One-shot** requests (empty channel name) answer the caller directly.
//! - **Streaming** requests acknowledge as soon as the live query is open,
//!   then push on the named channel from a spawned task until the operation
//!   terminates or the host cancels the channel.
//!
//! Downloads are always observed, with or without a channel, because the
//! local copy is only made once the platform reports the file as current.
//!
//! ## Usage
//!
//! ```ignore
//! use core_documents::SyncController;
//!
//! let controller = SyncController::from_config(&config);
//! controller.create_event_channel("upload-1")?;
//! let mut events = controller.listen("upload-1").unwrap();
//!
//! controller
//!     .upload("iCloud.com.example", "/tmp/a.txt", "Documents/a.txt", "upload-1")
//!     .await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

use crate::coordinated::CoordinatedFileAccess;
use crate::error::{DocumentError, Result};
use crate::operation::{OperationKind, SyncOperation};
use crate::query::{MetadataQueryAdapter, QueryEvent, QueryEventKind, QueryHandle, QueryPredicate};
use crate::record::FileStatusRecord;
use crate::registry::{EventChannelHandle, EventStreamRegistry};
use bridge_traits::{FileCoordinator, MetadataQueryService, UbiquityContainers, UbiquityFileSystem};
use core_runtime::config::CoreConfig;
use core_runtime::events::EventReceiver;
use core_runtime::logging::strip_path;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

const GATHER_INTERRUPTED: &str = "Metadata query ended before gathering finished";

/// Entry point for document operations
#[derive(Clone)]
pub struct SyncController {
    containers: Arc<dyn UbiquityContainers>,
    file_system: Arc<dyn UbiquityFileSystem>,
    queries: MetadataQueryAdapter,
    coordinated: CoordinatedFileAccess,
    registry: EventStreamRegistry,
    liveness_warning: Option<Duration>,
}

impl SyncController {
    pub fn new(
        containers: Arc<dyn UbiquityContainers>,
        file_system: Arc<dyn UbiquityFileSystem>,
        metadata_queries: Arc<dyn MetadataQueryService>,
        file_coordinator: Arc<dyn FileCoordinator>,
    ) -> Self {
        Self {
            containers,
            coordinated: CoordinatedFileAccess::new(Arc::clone(&file_system), file_coordinator),
            file_system,
            queries: MetadataQueryAdapter::new(metadata_queries),
            registry: EventStreamRegistry::new(),
            liveness_warning: None,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.containers),
            Arc::clone(&config.file_system),
            Arc::clone(&config.metadata_queries),
            Arc::clone(&config.file_coordinator),
        )
        .with_liveness_warning(config.liveness_warning_secs.map(Duration::from_secs))
    }

    /// Warn when an active operation sees no query event for `interval`
    pub fn with_liveness_warning(mut self, interval: Option<Duration>) -> Self {
        self.liveness_warning = interval;
        self
    }

    pub fn registry(&self) -> &EventStreamRegistry {
        &self.registry
    }

    // ========================================================================
    // Event channels
    // ========================================================================

    /// Create (or replace) the event channel `name`
    pub fn create_event_channel(&self, name: &str) -> Result<Arc<EventChannelHandle>> {
        if name.is_empty() {
            return Err(DocumentError::InvalidArgument(
                "eventChannelName must not be empty".to_string(),
            ));
        }
        Ok(self.registry.register(name))
    }

    /// Take the receiving side of channel `name`; only the first call gets it
    pub fn listen(&self, name: &str) -> Option<EventReceiver> {
        self.registry.lookup(name)?.listen()
    }

    /// Cancel channel `name`. Returns `false` if no such channel is registered.
    pub fn cancel(&self, name: &str) -> bool {
        match self.registry.lookup(name) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    fn channel_for(&self, name: &str) -> Result<Option<Arc<EventChannelHandle>>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.registry
            .lookup(name)
            .map(Some)
            .ok_or_else(|| {
                DocumentError::InvalidArgument(format!("Event channel {} was not created", name))
            })
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// List the container's files.
    ///
    /// Without a channel, returns the first complete snapshot. With a
    /// channel, returns `None` once the query is open and pushes every
    /// snapshot until the channel is cancelled.
    #[instrument(skip_all, fields(container_id = %container_id, channel = %event_channel))]
    pub async fn gather(
        &self,
        container_id: &str,
        event_channel: &str,
    ) -> Result<Option<Vec<FileStatusRecord>>> {
        let channel = self.channel_for(event_channel)?;
        let mut op = SyncOperation::new(OperationKind::Gather, container_id, event_channel);
        let root = self.resolve_container(&mut op).await?;

        let query = match self.queries.open(&root, QueryPredicate::Container).await {
            Ok(query) => query,
            Err(e) => return Err(fail_operation(&mut op, e)),
        };
        op.activate()?;

        let mut task = OperationTask::new(op, query, channel, self.liveness_warning);
        if task.channel.is_some() {
            tokio::spawn(run_gather(task));
            return Ok(None);
        }

        loop {
            match task.next().await {
                TaskSignal::Event(event) if event.kind == QueryEventKind::FinishGathering => {
                    let records = event.records();
                    task.complete();
                    return Ok(Some(records));
                }
                TaskSignal::Event(_) => continue,
                TaskSignal::Cancelled | TaskSignal::QueryEnded => {
                    task.fail(DocumentError::NativeIo(GATHER_INTERRUPTED.to_string()));
                    return Err(DocumentError::NativeIo(GATHER_INTERRUPTED.to_string()));
                }
            }
        }
    }

    /// Copy a local file into the container, replacing any existing file.
    ///
    /// With a channel, upload progress is pushed until it reaches 100.
    #[instrument(skip_all, fields(container_id = %container_id, channel = %event_channel))]
    pub async fn upload(
        &self,
        container_id: &str,
        local_file_path: &str,
        cloud_file_path: &str,
        event_channel: &str,
    ) -> Result<()> {
        let channel = self.channel_for(event_channel)?;
        let mut op = SyncOperation::new(OperationKind::Upload, container_id, event_channel);
        let root = self.resolve_container(&mut op).await?;

        let cloud = container_path(&root, cloud_file_path);
        let local = PathBuf::from(local_file_path);

        if let Err(e) = replace_item(self.file_system.as_ref(), &local, &cloud).await {
            return Err(fail_operation(&mut op, e));
        }
        debug!(file = %strip_path(cloud_file_path), "Copied local file into container");

        let Some(channel) = channel else {
            op.complete()?;
            info!(operation_id = %op.id, "Upload completed");
            return Ok(());
        };

        let query = match self.queries.open(&root, QueryPredicate::Item(cloud)).await {
            Ok(query) => query,
            Err(e) => {
                let error = fail_operation(&mut op, e);
                channel.fail(error.to_payload());
                return Err(error);
            }
        };
        op.activate()?;

        tokio::spawn(run_upload(OperationTask::new(
            op,
            query,
            Some(channel),
            self.liveness_warning,
        )));
        Ok(())
    }

    /// Download a cloud file and copy it to `local_file_path` once current.
    ///
    /// The download is observed whether or not a channel is given.
    #[instrument(skip_all, fields(container_id = %container_id, channel = %event_channel))]
    pub async fn download(
        &self,
        container_id: &str,
        cloud_file_path: &str,
        local_file_path: &str,
        event_channel: &str,
    ) -> Result<()> {
        let channel = self.channel_for(event_channel)?;
        let mut op = SyncOperation::new(OperationKind::Download, container_id, event_channel);
        let root = self.resolve_container(&mut op).await?;

        let cloud = container_path(&root, cloud_file_path);
        let local = PathBuf::from(local_file_path);

        if let Err(e) = self.file_system.start_downloading(&cloud).await {
            return Err(fail_operation(&mut op, e.into()));
        }

        let query = match self
            .queries
            .open(&root, QueryPredicate::Item(cloud.clone()))
            .await
        {
            Ok(query) => query,
            Err(e) => return Err(fail_operation(&mut op, e)),
        };
        op.activate()?;

        tokio::spawn(run_download(
            OperationTask::new(op, query, channel, self.liveness_warning),
            Arc::clone(&self.file_system),
            cloud,
            local,
        ));
        Ok(())
    }

    /// Delete a file from the container under coordinated access
    #[instrument(skip_all, fields(container_id = %container_id))]
    pub async fn delete(&self, container_id: &str, cloud_file_path: &str) -> Result<()> {
        let mut op = SyncOperation::new(OperationKind::Delete, container_id, "");
        let root = self.resolve_container(&mut op).await?;

        match self
            .coordinated
            .delete(&container_path(&root, cloud_file_path))
            .await
        {
            Ok(()) => {
                op.complete()?;
                Ok(())
            }
            Err(e) => Err(fail_operation(&mut op, e)),
        }
    }

    /// Move a file inside the container under coordinated access
    #[instrument(skip_all, fields(container_id = %container_id))]
    pub async fn move_item(
        &self,
        container_id: &str,
        from_cloud_path: &str,
        to_cloud_path: &str,
    ) -> Result<()> {
        let mut op = SyncOperation::new(OperationKind::Move, container_id, "");
        let root = self.resolve_container(&mut op).await?;

        let from = container_path(&root, from_cloud_path);
        let to = container_path(&root, to_cloud_path);

        match self.coordinated.move_item(&from, &to).await {
            Ok(()) => {
                op.complete()?;
                Ok(())
            }
            Err(e) => Err(fail_operation(&mut op, e)),
        }
    }

    async fn resolve_container(&self, op: &mut SyncOperation) -> Result<PathBuf> {
        op.resolve()?;

        let resolved = match self.containers.container_url(&op.container_id).await {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, "Container resolution failed");
                None
            }
        };

        match resolved {
            Some(root) => Ok(root),
            None => {
                let error = DocumentError::ContainerUnavailable {
                    container_id: op.container_id.clone(),
                };
                Err(fail_operation(op, error))
            }
        }
    }
}

/// Absolute path of `relative` inside the container
fn container_path(root: &Path, relative: &str) -> PathBuf {
    root.join(relative.trim_start_matches('/'))
}

/// Copy `from` to `to`, replacing an existing `to` and creating its parents
async fn replace_item(fs: &dyn UbiquityFileSystem, from: &Path, to: &Path) -> Result<()> {
    if fs.exists(to).await? {
        fs.remove_item(to).await?;
    } else if let Some(parent) = to.parent() {
        if !fs.exists(parent).await? {
            fs.create_dir_all(parent).await?;
        }
    }
    fs.copy_item(from, to).await?;
    Ok(())
}

fn fail_operation(op: &mut SyncOperation, error: DocumentError) -> DocumentError {
    if let Err(e) = op.fail(error.kind()) {
        warn!(operation_id = %op.id, error = %e, "Could not record operation failure");
    }
    error!(
        operation_id = %op.id,
        kind = %op.kind,
        channel = %op.channel_name,
        error = %error,
        "Operation failed"
    );
    error
}

async fn liveness_elapsed(interval: Option<Duration>) {
    match interval {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Streaming tasks
// ============================================================================

enum TaskSignal {
    Event(QueryEvent),
    Cancelled,
    QueryEnded,
}

/// An active operation and the resources it owns
struct OperationTask {
    op: SyncOperation,
    query: QueryHandle,
    channel: Option<Arc<EventChannelHandle>>,
    cancel: CancellationToken,
    liveness_warning: Option<Duration>,
}

impl OperationTask {
    fn new(
        op: SyncOperation,
        query: QueryHandle,
        channel: Option<Arc<EventChannelHandle>>,
        liveness_warning: Option<Duration>,
    ) -> Self {
        let cancel = channel
            .as_ref()
            .map(|channel| channel.cancellation_token())
            .unwrap_or_default();
        Self {
            op,
            query,
            channel,
            cancel,
            liveness_warning,
        }
    }

    /// Next query event, cancellation or end of the query
    async fn next(&mut self) -> TaskSignal {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return TaskSignal::Cancelled,
                event = self.query.next() => {
                    return match event {
                        Some(event) => TaskSignal::Event(event),
                        None => TaskSignal::QueryEnded,
                    };
                }
                _ = liveness_elapsed(self.liveness_warning) => {
                    warn!(
                        operation_id = %self.op.id,
                        kind = %self.op.kind,
                        "No metadata query events received; still waiting"
                    );
                }
            }
        }
    }

    fn push_data(&self, value: serde_json::Value) {
        if let Some(channel) = &self.channel {
            channel.push_data(value);
        }
    }

    fn push_error(&self, error: &DocumentError) {
        if let Some(channel) = &self.channel {
            channel.push_error(error.to_payload());
        }
    }

    fn complete(mut self) {
        self.query.stop();
        if let Some(channel) = &self.channel {
            channel.finish();
        }
        match self.op.complete() {
            Ok(()) => info!(operation_id = %self.op.id, kind = %self.op.kind, "Operation completed"),
            Err(e) => warn!(operation_id = %self.op.id, error = %e, "Could not complete operation"),
        }
    }

    fn fail(mut self, error: DocumentError) {
        self.query.stop();
        if let Some(channel) = &self.channel {
            channel.fail(error.to_payload());
        }
        fail_operation(&mut self.op, error);
    }

    fn cancelled(mut self) {
        self.query.stop();
        if let Some(channel) = &self.channel {
            channel.cancel();
        }
        match self.op.cancel() {
            Ok(()) => info!(operation_id = %self.op.id, kind = %self.op.kind, "Operation cancelled"),
            Err(e) => warn!(operation_id = %self.op.id, error = %e, "Could not cancel operation"),
        }
    }

    fn query_ended(mut self) {
        warn!(operation_id = %self.op.id, "Metadata query ended unexpectedly");
        self.query.stop();
        if let Some(channel) = &self.channel {
            channel.close();
        }
        fail_operation(
            &mut self.op,
            DocumentError::NativeIo("Metadata query ended".to_string()),
        );
    }
}

async fn run_gather(mut task: OperationTask) {
    loop {
        match task.next().await {
            TaskSignal::Event(event) => match serde_json::to_value(event.records()) {
                Ok(records) => task.push_data(records),
                Err(e) => warn!(error = %e, "Failed to encode file status records"),
            },
            TaskSignal::Cancelled => return task.cancelled(),
            TaskSignal::QueryEnded => return task.query_ended(),
        }
    }
}

async fn run_upload(mut task: OperationTask) {
    let mut last_pushed: Option<f64> = None;

    loop {
        let item = match task.next().await {
            TaskSignal::Event(event) => match event.items.into_iter().next() {
                Some(item) => item,
                None => continue,
            },
            TaskSignal::Cancelled => return task.cancelled(),
            TaskSignal::QueryEnded => return task.query_ended(),
        };

        if let Some(message) = &item.uploading_error {
            warn!(operation_id = %task.op.id, "Platform reported an uploading error");
            task.push_error(&DocumentError::NativeIo(message.clone()));
        }

        if let Some(percent) = item.percent_uploaded {
            if last_pushed.map_or(true, |last| percent >= last) {
                last_pushed = Some(percent);
                task.push_data(json!(percent));
            }
        }

        if item.is_upload_complete() {
            return task.complete();
        }
    }
}

async fn run_download(
    mut task: OperationTask,
    fs: Arc<dyn UbiquityFileSystem>,
    cloud: PathBuf,
    local: PathBuf,
) {
    loop {
        let item = match task.next().await {
            TaskSignal::Event(event) => match event.items.into_iter().next() {
                Some(item) => item,
                None => continue,
            },
            TaskSignal::Cancelled => return task.cancelled(),
            TaskSignal::QueryEnded => return task.query_ended(),
        };

        if let Some(message) = &item.downloading_error {
            warn!(operation_id = %task.op.id, "Platform reported a downloading error");
            task.push_error(&DocumentError::NativeIo(message.clone()));
        }

        if let Some(percent) = item.percent_downloaded {
            task.push_data(json!(percent));
        }

        if item.is_download_complete() {
            // A cancellation arriving now does not interrupt the copy.
            return match replace_item(fs.as_ref(), &cloud, &local).await {
                Ok(()) => {
                    debug!(file = %strip_path(&local.to_string_lossy()), "Copied downloaded file");
                    task.complete()
                }
                Err(e) => task.fail(e),
            };
        }
    }
}
