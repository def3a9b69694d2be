use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Record store error: {0}")]
    Store(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, KvError>;
