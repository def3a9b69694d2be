//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the iCloud bridge core:
//! - Logging and tracing infrastructure
//! - Configuration management and bridge injection
//! - Event channel primitives used to stream progress to the host
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! for the [`CoreConfig`](config::CoreConfig) that carries the injected
//! platform bridges, and for the push-stream types behind event channels.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
