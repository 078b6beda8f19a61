use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("HTTP {status} from {path}")]
    Status { path: String, status: u16 },

    #[error("Server rejected {path}: {message}")]
    Server { path: String, message: String },

    #[error("Request to {path} was superseded")]
    Cancelled { path: String },

    #[error("Giving up on {path} after {attempts} attempts")]
    GaveUp { path: String, attempts: u32 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),
}

impl SyncError {
    /// Superseded requests are expected and never reported.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
