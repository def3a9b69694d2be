use thiserror::Error;

/// Errors raised while configuring the core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Bridge initialization failed: {0}")]
    BridgeInit(String),
}

pub type Result<T> = std::result::Result<T, Error>;
