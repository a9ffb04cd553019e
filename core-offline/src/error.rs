use bridge_traits::error::BridgeError;
use core_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Storage quota exceeded: need {needed_bytes} bytes, {available_bytes} available")]
    QuotaExceeded {
        needed_bytes: u64,
        available_bytes: u64,
    },

    #[error("Invalid import format: {0}")]
    InvalidFormat(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Encoding(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
