//! # Documents Module
//!
//! Moves files between the local disk and an iCloud ubiquity container and
//! reports their sync status.
//!
//! ## Overview
//!
//! This module manages:
//! - Gathering the container's file list as [`FileStatusRecord`]s
//! - Uploading and downloading with progress pushed on event channels
//! - Deleting and moving files under coordinated access
//! - The registry of named event channels the host listens on
//!
//! ## Components
//!
//! - **Sync Controller** (`controller`): Runs every document operation
//! - **Operation State Machine** (`operation`): Lifecycle of one request
//! - **Metadata Query Adapter** (`query`): Typed snapshots of a live query
//! - **Event Stream Registry** (`registry`): Named push streams
//! - **Coordinated Access** (`coordinated`): Delete and move under a coordinator

pub mod controller;
pub mod coordinated;
pub mod error;
pub mod operation;
pub mod query;
pub mod record;
pub mod registry;

pub use controller::SyncController;
pub use coordinated::CoordinatedFileAccess;
pub use error::{DocumentError, ErrorKind, Result};
pub use operation::{
    FailureKind, OperationKind, OperationState, SyncOperation, SyncOperationId,
};
pub use query::{
    MetadataQueryAdapter, QueryEvent, QueryEventKind, QueryHandle, QueryPredicate, TrackedItem,
};
pub use record::{DownloadStatus, FileStatusRecord};
pub use registry::{EventChannelHandle, EventStreamRegistry};
