//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS without iCloud entitlements, Windows, Linux).
//!
//! ## Overview
//!
//! A ubiquity container is emulated by a plain directory, which makes the
//! core runnable in development and in tests:
//! - `UbiquityContainers` using one directory per container id
//! - `UbiquityFileSystem` using `tokio::fs`
//! - `MetadataQueryService` polling the directory tree
//! - `FileCoordinator` with in-process path locks
//! - `CloudRecordStore` using SQLite
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DirectoryContainers, PollingMetadataQuery, TokioUbiquityFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let containers = DirectoryContainers::with_base_dir("/tmp/containers");
//!     let fs = TokioUbiquityFileSystem::new();
//!     let queries = PollingMetadataQuery::new();
//!
//!     // Use in core configuration
//! }
//! ```

mod containers;
mod coordinator;
mod filesystem;
mod query;
mod records;

pub use containers::DirectoryContainers;
pub use coordinator::PathLockCoordinator;
pub use filesystem::TokioUbiquityFileSystem;
pub use query::{PollingMetadataQuery, DEFAULT_POLL_INTERVAL};
pub use records::SqliteRecordStore;
