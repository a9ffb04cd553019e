use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Remote API error ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error came back from the remote API with a status code,
    /// as opposed to never reaching it.
    pub fn is_remote_rejection(&self) -> bool {
        matches!(self, BridgeError::Remote { .. })
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
