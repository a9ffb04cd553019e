use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync operation {operation_id} not found")]
    OperationNotFound { operation_id: String },

    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),

    #[error("Invalid operation status: {0}")]
    InvalidStatus(String),

    #[error("Invalid operation type: {0}")]
    InvalidOperationType(String),

    #[error("Invalid resource kind: {0}")]
    InvalidResource(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Queue is offline")]
    Offline,

    #[error("Remote error: {0}")]
    Remote(#[from] BridgeError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Payload encoding error: {0}")]
    Payload(String),
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
