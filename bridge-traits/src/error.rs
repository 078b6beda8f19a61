use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the failure is a transport-level problem worth retrying.
    pub fn is_transient(&self) -> bool {
        !matches!(self, BridgeError::NotAvailable(_) | BridgeError::Storage(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
