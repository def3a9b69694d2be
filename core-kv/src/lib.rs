//! # Key-Value Module
//!
//! String storage on top of a container's private record database.
//!
//! Values are saved as fresh `StorageItem` records; reading a key returns
//! every string stored under it, in the order the store reports them.

pub mod error;
pub mod store;

pub use error::{KvError, Result};
pub use store::KvStore;
