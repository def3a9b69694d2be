use bridge_traits::BridgeError;
use core_runtime::events::ErrorPayload;
use thiserror::Error;

/// Host-facing error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    ContainerUnavailable,
    FileNotFound,
    NativeIo,
}

impl ErrorKind {
    /// Stable code reported to the host
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "E_ARG",
            ErrorKind::ContainerUnavailable => "E_CTR",
            ErrorKind::FileNotFound => "E_FNF",
            ErrorKind::NativeIo => "E_NAT",
        }
    }

    /// Fixed message reported to the host
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "Invalid Arguments",
            ErrorKind::ContainerUnavailable => {
                "Invalid containerId, or user is not signed in, or user disabled iCloud permission"
            }
            ErrorKind::FileNotFound => "The file does not exist",
            ErrorKind::NativeIo => "Native Code Error",
        }
    }
}

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Container {container_id} is unavailable")]
    ContainerUnavailable { container_id: String },

    #[error("File does not exist: {path}")]
    FileNotFound { path: String },

    #[error("{0}")]
    NativeIo(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl DocumentError {
    /// Category used when reporting to the host
    ///
    /// Internal state errors surface as native errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DocumentError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            DocumentError::ContainerUnavailable { .. } => ErrorKind::ContainerUnavailable,
            DocumentError::FileNotFound { .. } => ErrorKind::FileNotFound,
            DocumentError::NativeIo(_)
            | DocumentError::InvalidStateTransition { .. } => ErrorKind::NativeIo,
        }
    }

    /// Build the payload pushed or returned to the host
    ///
    /// Only native errors carry details (the native error description).
    pub fn to_payload(&self) -> ErrorPayload {
        let kind = self.kind();
        let payload = ErrorPayload::new(kind.code(), kind.message());
        match kind {
            ErrorKind::NativeIo => payload.with_details(self.to_string()),
            _ => payload,
        }
    }
}

impl From<BridgeError> for DocumentError {
    fn from(error: BridgeError) -> Self {
        DocumentError::NativeIo(error.to_string())
    }
}

impl From<DocumentError> for ErrorPayload {
    fn from(error: DocumentError) -> Self {
        error.to_payload()
    }
}

pub type Result<T> = std::result::Result<T, DocumentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_messages() {
        assert_eq!(ErrorKind::InvalidArgument.code(), "E_ARG");
        assert_eq!(ErrorKind::ContainerUnavailable.code(), "E_CTR");
        assert_eq!(ErrorKind::FileNotFound.code(), "E_FNF");
        assert_eq!(ErrorKind::NativeIo.code(), "E_NAT");
        assert_eq!(ErrorKind::NativeIo.message(), "Native Code Error");
    }

    #[test]
    fn test_native_payload_carries_details() {
        let error = DocumentError::from(BridgeError::OperationFailed("disk full".to_string()));
        let payload = error.to_payload();

        assert_eq!(payload.code, "E_NAT");
        assert_eq!(payload.message, "Native Code Error");
        assert!(payload.details.unwrap().contains("disk full"));
    }

    #[test]
    fn test_other_payloads_have_no_details() {
        let payload = DocumentError::FileNotFound {
            path: "a.txt".to_string(),
        }
        .to_payload();

        assert_eq!(payload.code, "E_FNF");
        assert_eq!(payload.message, "The file does not exist");
        assert_eq!(payload.details, None);
    }

    #[test]
    fn test_state_errors_surface_as_native() {
        let error = DocumentError::InvalidStateTransition {
            from: "completed".to_string(),
            to: "active".to_string(),
        };
        assert_eq!(error.kind(), ErrorKind::NativeIo);
    }
}
