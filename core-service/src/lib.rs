//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (ubiquity
//! containers, file system, metadata queries, file coordination, record
//! store) into the document and key-value cores, and exposes the namespaced
//! method surface the host calls (`documents.upload`, `kv.getString`, ...).
//! Desktop apps typically enable the `desktop-shims` feature, which backs
//! every bridge with the implementations from `bridge-desktop`.

pub mod dispatch;
pub mod error;

pub use dispatch::{MethodCall, MethodResponse};
pub use error::{Result, ServiceError};

use std::sync::Arc;

use bridge_traits::{
    CloudRecordStore, FileCoordinator, MetadataQueryService, UbiquityContainers,
    UbiquityFileSystem,
};
use core_documents::SyncController;
use core_kv::KvStore;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventReceiver;

/// Aggregated handle to all bridge dependencies the core requires.
pub struct CoreDependencies {
    pub containers: Arc<dyn UbiquityContainers>,
    pub file_system: Arc<dyn UbiquityFileSystem>,
    pub metadata_queries: Arc<dyn MetadataQueryService>,
    pub file_coordinator: Arc<dyn FileCoordinator>,
    pub record_store: Arc<dyn CloudRecordStore>,
}

impl CoreDependencies {
    /// Construct a dependency bundle from explicit bridge handles.
    pub fn new(
        containers: Arc<dyn UbiquityContainers>,
        file_system: Arc<dyn UbiquityFileSystem>,
        metadata_queries: Arc<dyn MetadataQueryService>,
        file_coordinator: Arc<dyn FileCoordinator>,
        record_store: Arc<dyn CloudRecordStore>,
    ) -> Self {
        Self {
            containers,
            file_system,
            metadata_queries,
            file_coordinator,
            record_store,
        }
    }
}

impl From<&CoreConfig> for CoreDependencies {
    fn from(config: &CoreConfig) -> Self {
        Self::new(
            Arc::clone(&config.containers),
            Arc::clone(&config.file_system),
            Arc::clone(&config.metadata_queries),
            Arc::clone(&config.file_coordinator),
            Arc::clone(&config.record_store),
        )
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CloudKitService {
    deps: Arc<CoreDependencies>,
    documents: SyncController,
    kv: KvStore,
}

impl CloudKitService {
    /// Create a new service from the provided dependencies.
    pub fn new(deps: CoreDependencies) -> Self {
        let documents = SyncController::new(
            Arc::clone(&deps.containers),
            Arc::clone(&deps.file_system),
            Arc::clone(&deps.metadata_queries),
            Arc::clone(&deps.file_coordinator),
        );
        let kv = KvStore::new(Arc::clone(&deps.record_store));

        Self {
            deps: Arc::new(deps),
            documents,
            kv,
        }
    }

    /// Create a service honouring every setting of `config`.
    pub fn from_config(config: &CoreConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            deps: Arc::new(CoreDependencies::from(config)),
            documents: SyncController::from_config(config),
            kv: KvStore::from_config(config),
        })
    }

    /// Access the bridge dependencies being used by the service.
    pub fn dependencies(&self) -> Arc<CoreDependencies> {
        Arc::clone(&self.deps)
    }

    pub fn documents(&self) -> &SyncController {
        &self.documents
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    /// Receiving side of an event channel; only the first call gets it
    pub fn listen(&self, event_channel_name: &str) -> Option<EventReceiver> {
        self.documents.listen(event_channel_name)
    }

    /// Cancel an event channel and the operation feeding it.
    ///
    /// Returns `false` when no channel of that name is registered.
    pub fn cancel(&self, event_channel_name: &str) -> bool {
        self.documents.cancel(event_channel_name)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// use core_service::{bootstrap_desktop, MethodCall};
///
/// let core = bootstrap_desktop()?;
/// let response = core
///     .handle(MethodCall::new("documents.gather", serde_json::json!({
///         "containerId": "iCloud.com.example.app",
///         "eventChannelName": "",
///     })))
///     .await;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub fn bootstrap_desktop() -> Result<CloudKitService> {
    let config = CoreConfig::builder()
        .build()
        .map_err(|err| ServiceError::InitializationFailed(err.to_string()))?;
    CloudKitService::from_config(&config)
}
