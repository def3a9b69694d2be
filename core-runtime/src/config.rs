//! # Core Configuration Module
//!
//! Provides configuration management for the iCloud bridge core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every platform bridge and the tunable settings of the
//! core. It enforces fail-fast validation so that a missing bridge is reported
//! at startup rather than on the first host call.
//!
//! ## Required Dependencies
//!
//! - `UbiquityContainers` - Resolves container identifiers to root paths
//! - `UbiquityFileSystem` - Copy/move/remove inside a container
//! - `MetadataQueryService` - Live per-item sync status
//! - `FileCoordinator` - Mutual exclusion for delete/move
//! - `CloudRecordStore` - Key-value records
//!
//! When the `desktop-shims` feature is enabled, directory-backed defaults
//! from `bridge-desktop` are injected for every bridge that is not provided.
//!
//! ## Usage
//!
//! ### Desktop Defaults
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .containers_root("/tmp/Mobile Documents")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### Custom Bridges
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .containers(Arc::new(MyContainers))
//!     .file_system(Arc::new(MyFileSystem))
//!     .metadata_queries(Arc::new(MyQueries))
//!     .file_coordinator(Arc::new(MyCoordinator))
//!     .record_store(Arc::new(MyRecordStore))
//!     .liveness_warning_secs(Some(60))
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! Without the `desktop-shims` feature, a missing bridge yields
//! [`Error::CapabilityMissing`] naming the capability and how to provide it.

use crate::error::{Error, Result};
use bridge_traits::{
    CloudRecordStore, FileCoordinator, MetadataQueryService, UbiquityContainers,
    UbiquityFileSystem, STORAGE_ITEM_RECORD_TYPE,
};
#[cfg(feature = "desktop-shims")]
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// Default interval after which a silent operation logs a warning
pub const DEFAULT_LIVENESS_WARNING_SECS: u64 = 300;

/// Default rescan interval of the desktop polling query
pub const DEFAULT_QUERY_POLL_INTERVAL_MS: u64 = 500;

/// Core configuration for the iCloud bridge core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Container identifier resolution
    pub containers: Arc<dyn UbiquityContainers>,

    /// File operations inside containers
    pub file_system: Arc<dyn UbiquityFileSystem>,

    /// Live metadata queries
    pub metadata_queries: Arc<dyn MetadataQueryService>,

    /// Coordinated file access
    pub file_coordinator: Arc<dyn FileCoordinator>,

    /// Private cloud database
    pub record_store: Arc<dyn CloudRecordStore>,

    /// Record type used by the key-value store
    pub record_type: String,

    /// Warn when an operation sees no query event for this long (`None` disables)
    pub liveness_warning_secs: Option<u64>,

    /// Rescan interval for the desktop polling query
    pub query_poll_interval_ms: u64,

    /// Root directory of desktop containers
    pub containers_root: Option<PathBuf>,

    /// SQLite file of the desktop record store
    pub database_path: Option<PathBuf>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("containers", &"UbiquityContainers { ... }")
            .field("file_system", &"UbiquityFileSystem { ... }")
            .field("metadata_queries", &"MetadataQueryService { ... }")
            .field("file_coordinator", &"FileCoordinator { ... }")
            .field("record_store", &"CloudRecordStore { ... }")
            .field("record_type", &self.record_type)
            .field("liveness_warning_secs", &self.liveness_warning_secs)
            .field("query_poll_interval_ms", &self.query_poll_interval_ms)
            .field("containers_root", &self.containers_root)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Record type is not empty
    /// - Liveness interval, when set, is greater than zero
    /// - Poll interval is greater than zero
    /// - Paths, when set, are not empty
    pub fn validate(&self) -> Result<()> {
        if self.record_type.trim().is_empty() {
            return Err(Error::Config("Record type cannot be empty".to_string()));
        }

        if self.liveness_warning_secs == Some(0) {
            return Err(Error::Config(
                "Liveness warning interval must be greater than 0 seconds. \
                 Use None to disable the warning."
                    .to_string(),
            ));
        }

        if self.query_poll_interval_ms == 0 {
            return Err(Error::Config(
                "Query poll interval must be greater than 0ms".to_string(),
            ));
        }

        if matches!(&self.containers_root, Some(path) if path.as_os_str().is_empty()) {
            return Err(Error::Config("Containers root cannot be empty".to_string()));
        }

        if matches!(&self.database_path, Some(path) if path.as_os_str().is_empty()) {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, native: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required {}. \
             Desktop: enable the 'desktop-shims' feature to use the bridge-desktop default. \
             Apple platforms: inject the {} backed implementation.",
            capability, purpose, native
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn desktop_containers(root: Option<&Path>) -> bridge_desktop::DirectoryContainers {
    match root {
        Some(root) => bridge_desktop::DirectoryContainers::with_base_dir(root),
        None => bridge_desktop::DirectoryContainers::new(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_containers(root: Option<&Path>) -> Result<Arc<dyn UbiquityContainers>> {
    let containers: Arc<dyn UbiquityContainers> = Arc::new(desktop_containers(root));
    Ok(containers)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_containers(_root: Option<&std::path::Path>) -> Result<Arc<dyn UbiquityContainers>> {
    Err(capability_missing(
        "UbiquityContainers",
        "to resolve container identifiers",
        "FileManager.url(forUbiquityContainerIdentifier:)",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn UbiquityFileSystem>> {
    let fs: Arc<dyn UbiquityFileSystem> = Arc::new(bridge_desktop::TokioUbiquityFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn UbiquityFileSystem>> {
    Err(capability_missing(
        "UbiquityFileSystem",
        "for file transfers inside a container",
        "FileManager",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_metadata_queries(poll_interval_ms: u64) -> Result<Arc<dyn MetadataQueryService>> {
    use std::time::Duration;

    let queries: Arc<dyn MetadataQueryService> = Arc::new(
        bridge_desktop::PollingMetadataQuery::with_poll_interval(Duration::from_millis(
            poll_interval_ms,
        )),
    );
    Ok(queries)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_metadata_queries(_poll_interval_ms: u64) -> Result<Arc<dyn MetadataQueryService>> {
    Err(capability_missing(
        "MetadataQueryService",
        "to observe sync status",
        "NSMetadataQuery",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_coordinator() -> Result<Arc<dyn FileCoordinator>> {
    let coordinator: Arc<dyn FileCoordinator> = Arc::new(bridge_desktop::PathLockCoordinator::new());
    Ok(coordinator)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_coordinator() -> Result<Arc<dyn FileCoordinator>> {
    Err(capability_missing(
        "FileCoordinator",
        "for coordinated delete and move",
        "NSFileCoordinator",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_record_store(
    database_path: Option<&Path>,
    containers_root: Option<&Path>,
) -> Result<Arc<dyn CloudRecordStore>> {
    use bridge_desktop::SqliteRecordStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let candidate = match database_path {
        Some(path) => path.to_path_buf(),
        None => {
            let base = desktop_containers(containers_root).base_dir().to_path_buf();
            base.parent()
                .map(|parent| parent.join("records.sqlite"))
                .unwrap_or_else(|| base.join("records.sqlite"))
        }
    };

    let init_store = |path: PathBuf| -> Result<_> {
        let runtime = Runtime::new().map_err(|e| {
            Error::BridgeInit(format!(
                "Failed to create Tokio runtime for default record store: {}",
                e
            ))
        })?;

        runtime.block_on(SqliteRecordStore::new(path)).map_err(|e| {
            Error::BridgeInit(format!("Failed to initialize default CloudRecordStore: {}", e))
        })
    };

    let store = match Handle::try_current() {
        Ok(_) => {
            let path = candidate.clone();
            thread::spawn(move || init_store(path))
                .join()
                .map_err(|_| {
                    Error::BridgeInit(
                        "Tokio worker thread panicked while creating default CloudRecordStore"
                            .to_string(),
                    )
                })??
        }
        Err(_) => init_store(candidate)?,
    };

    let store: Arc<dyn CloudRecordStore> = Arc::new(store);
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_record_store(
    _database_path: Option<&std::path::Path>,
    _containers_root: Option<&std::path::Path>,
) -> Result<Arc<dyn CloudRecordStore>> {
    Err(capability_missing(
        "CloudRecordStore",
        "for key-value records",
        "CKContainer.privateCloudDatabase",
    ))
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) once every bridge is set (or
/// when the `desktop-shims` feature provides the missing ones).
#[derive(Default)]
pub struct CoreConfigBuilder {
    containers: Option<Arc<dyn UbiquityContainers>>,
    file_system: Option<Arc<dyn UbiquityFileSystem>>,
    metadata_queries: Option<Arc<dyn MetadataQueryService>>,
    file_coordinator: Option<Arc<dyn FileCoordinator>>,
    record_store: Option<Arc<dyn CloudRecordStore>>,
    record_type: Option<String>,
    liveness_warning_secs: Option<Option<u64>>,
    query_poll_interval_ms: Option<u64>,
    containers_root: Option<PathBuf>,
    database_path: Option<PathBuf>,
}

impl CoreConfigBuilder {
    /// Sets the container resolver.
    pub fn containers(mut self, containers: Arc<dyn UbiquityContainers>) -> Self {
        self.containers = Some(containers);
        self
    }

    /// Sets the file system used inside containers.
    pub fn file_system(mut self, fs: Arc<dyn UbiquityFileSystem>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the metadata query service.
    pub fn metadata_queries(mut self, queries: Arc<dyn MetadataQueryService>) -> Self {
        self.metadata_queries = Some(queries);
        self
    }

    /// Sets the file coordinator.
    pub fn file_coordinator(mut self, coordinator: Arc<dyn FileCoordinator>) -> Self {
        self.file_coordinator = Some(coordinator);
        self
    }

    /// Sets the record store backing the key-value API.
    pub fn record_store(mut self, store: Arc<dyn CloudRecordStore>) -> Self {
        self.record_store = Some(store);
        self
    }

    /// Sets the record type used by the key-value API.
    ///
    /// Default: `StorageItem`
    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    /// Sets the liveness warning interval.
    ///
    /// Default: 300 seconds. `None` disables the warning.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .liveness_warning_secs(None);
    /// ```
    pub fn liveness_warning_secs(mut self, secs: Option<u64>) -> Self {
        self.liveness_warning_secs = Some(secs);
        self
    }

    /// Sets the rescan interval of the desktop polling query.
    ///
    /// Default: 500 ms
    pub fn query_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.query_poll_interval_ms = Some(interval_ms);
        self
    }

    /// Sets the directory holding desktop containers.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .containers_root("/tmp/Mobile Documents");
    /// ```
    pub fn containers_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.containers_root = Some(path.into());
        self
    }

    /// Sets the SQLite file of the desktop record store.
    ///
    /// Defaults to `records.sqlite` next to the containers root.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Returns
    ///
    /// Returns `Ok(CoreConfig)` on success, or an error if:
    /// - A bridge is missing and no desktop default is available
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let query_poll_interval_ms = self
            .query_poll_interval_ms
            .unwrap_or(DEFAULT_QUERY_POLL_INTERVAL_MS);
        let containers_root = self.containers_root;
        let database_path = self.database_path;

        let containers = match self.containers {
            Some(containers) => containers,
            None => provide_default_containers(containers_root.as_deref())?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        // A zero period panics in tokio intervals; validate() reports it below.
        let metadata_queries = match self.metadata_queries {
            Some(queries) => queries,
            None => provide_default_metadata_queries(query_poll_interval_ms.max(1))?,
        };

        let file_coordinator = match self.file_coordinator {
            Some(coordinator) => coordinator,
            None => provide_default_file_coordinator()?,
        };

        let record_store = match self.record_store {
            Some(store) => store,
            None => provide_default_record_store(
                database_path.as_deref(),
                containers_root.as_deref(),
            )?,
        };

        let config = CoreConfig {
            containers,
            file_system,
            metadata_queries,
            file_coordinator,
            record_store,
            record_type: self
                .record_type
                .unwrap_or_else(|| STORAGE_ITEM_RECORD_TYPE.to_string()),
            liveness_warning_secs: self
                .liveness_warning_secs
                .unwrap_or(Some(DEFAULT_LIVENESS_WARNING_SECS)),
            query_poll_interval_ms,
            containers_root,
            database_path,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        error::Result as BridgeResult, CloudRecord, CoordinationGuard, LiveQuery, QueryScope,
    };
    use std::path::Path;

    struct MockContainers;

    #[async_trait]
    impl UbiquityContainers for MockContainers {
        async fn container_url(&self, _container_id: &str) -> BridgeResult<Option<PathBuf>> {
            Ok(None)
        }
    }

    struct MockFileSystem;

    #[async_trait]
    impl UbiquityFileSystem for MockFileSystem {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn remove_item(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn copy_item(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn move_item(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn start_downloading(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct MockQueries;

    #[async_trait]
    impl MetadataQueryService for MockQueries {
        async fn start_query(&self, _root: &Path, _scope: QueryScope) -> BridgeResult<LiveQuery> {
            let (_publisher, query) = LiveQuery::channel();
            Ok(query)
        }
    }

    struct MockCoordinator;

    #[async_trait]
    impl FileCoordinator for MockCoordinator {
        async fn coordinate(&self, _paths: &[PathBuf]) -> BridgeResult<CoordinationGuard> {
            Ok(CoordinationGuard::noop())
        }
    }

    struct MockRecordStore;

    #[async_trait]
    impl CloudRecordStore for MockRecordStore {
        async fn query_records(
            &self,
            _container_id: &str,
            _record_type: &str,
        ) -> BridgeResult<Vec<CloudRecord>> {
            Ok(Vec::new())
        }

        async fn save_record(
            &self,
            _container_id: &str,
            record: CloudRecord,
        ) -> BridgeResult<CloudRecord> {
            Ok(record)
        }
    }

    fn mocked_builder() -> CoreConfigBuilder {
        CoreConfig::builder()
            .containers(Arc::new(MockContainers))
            .file_system(Arc::new(MockFileSystem))
            .metadata_queries(Arc::new(MockQueries))
            .file_coordinator(Arc::new(MockCoordinator))
            .record_store(Arc::new(MockRecordStore))
    }

    #[test]
    fn test_builder_with_all_bridges() {
        let config = mocked_builder().build().unwrap();

        assert_eq!(config.record_type, STORAGE_ITEM_RECORD_TYPE);
        assert_eq!(
            config.liveness_warning_secs,
            Some(DEFAULT_LIVENESS_WARNING_SECS)
        );
        assert_eq!(config.query_poll_interval_ms, DEFAULT_QUERY_POLL_INTERVAL_MS);
        assert!(config.containers_root.is_none());
    }

    #[test]
    fn test_builder_custom_settings() {
        let config = mocked_builder()
            .record_type("Preference")
            .liveness_warning_secs(None)
            .query_poll_interval_ms(50)
            .containers_root("/tmp/containers")
            .build()
            .unwrap();

        assert_eq!(config.record_type, "Preference");
        assert_eq!(config.liveness_warning_secs, None);
        assert_eq!(config.query_poll_interval_ms, 50);
        assert_eq!(
            config.containers_root.as_deref(),
            Some(Path::new("/tmp/containers"))
        );
    }

    #[test]
    fn test_empty_record_type_rejected() {
        let result = mocked_builder().record_type("  ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let liveness = mocked_builder().liveness_warning_secs(Some(0)).build();
        assert!(matches!(liveness, Err(Error::Config(_))));

        let poll = mocked_builder().query_poll_interval_ms(0).build();
        assert!(matches!(poll, Err(Error::Config(_))));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let result = mocked_builder().containers_root("").build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = mocked_builder().database_path("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_bridges() {
        let config = mocked_builder().build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("UbiquityContainers { ... }"));
        assert!(debug.contains("StorageItem"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_bridge_reports_capability() {
        let result = CoreConfig::builder()
            .containers(Arc::new(MockContainers))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, message }) => {
                assert_eq!(capability, "UbiquityFileSystem");
                assert!(message.contains("desktop-shims"));
            }
            other => panic!("expected CapabilityMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_fill_missing_bridges() {
        let dir = std::env::temp_dir().join(format!(
            "core-runtime-config-{}",
            std::process::id()
        ));
        let result = CoreConfig::builder()
            .containers_root(dir.join("Mobile Documents"))
            .database_path(dir.join("records.sqlite"))
            .build();

        assert!(result.is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }
}
