use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Corrupt record {id}: {message}")]
    CorruptRecord { id: String, message: String },

    #[error("Schema error: {0}")]
    Schema(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Schema(format!("JSON column encoding failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
