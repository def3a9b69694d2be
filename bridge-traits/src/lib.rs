//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the iCloud bridge core and the
//! platform frameworks it drives. Each trait is a capability the core needs
//! but that is implemented differently per platform (iOS/macOS natively,
//! desktop with a plain directory for development and tests).
//!
//! ## Traits
//!
//! ### Ubiquity containers
//! - [`UbiquityContainers`](ubiquity::UbiquityContainers) - Container id to root directory
//! - [`UbiquityFileSystem`](ubiquity::UbiquityFileSystem) - Copy, move, remove, start downloading
//! - [`MetadataQueryService`](ubiquity::MetadataQueryService) - Live per-item sync attributes
//! - [`FileCoordinator`](ubiquity::FileCoordinator) - Mutually exclusive file access
//!
//! ### Records
//! - [`CloudRecordStore`](records::CloudRecordStore) - Private cloud database records
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Platform
//! implementations convert native errors into it and keep the native
//! description, which the core forwards to the host verbatim.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; operations on different event
//! channels run on different tasks.

pub mod error;
pub mod logging;
pub mod records;
pub mod ubiquity;

pub use error::BridgeError;

pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use records::{CloudRecord, CloudRecordStore, STORAGE_ITEM_RECORD_TYPE};
pub use ubiquity::{
    CoordinationGuard, FileCoordinator, LiveQuery, MetadataQueryService, QueryItem,
    QueryNotification, QueryPublisher, QueryScope, UbiquityContainers, UbiquityFileSystem,
};
