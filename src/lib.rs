//! Umbrella crate for the CloudKit DB bridge core.
//!
//! Hosts depend on `cloudkit-db-workspace` and pick features instead of
//! wiring `core-service`, `core-runtime` and `bridge-desktop` one by one.
//! With `desktop-shims` (the default) the service façade is re-exported as
//! [`service`] and every platform bridge is backed by a local directory and
//! a SQLite record store.

#[cfg(feature = "desktop-shims")]
pub use core_service as service;
