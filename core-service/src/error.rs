use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Documents error: {0}")]
    Documents(#[from] core_documents::DocumentError),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
