use mongodb::bson;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Smoke test failed: {message}")]
    SmokeTest { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Invalid document id: {id}")]
    InvalidId { id: String },

    #[error("Document rejected by {collection} validator: {reason}")]
    ValidationRejected { collection: String, reason: String },

    #[error("Duplicate key in {collection}: {message}")]
    DuplicateKey { collection: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("MongoDB error: {0}")]
    Driver(#[from] mongodb::error::Error),
}

impl From<bson::ser::Error> for StorageError {
    fn from(err: bson::ser::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for StorageError {
    fn from(err: bson::de::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
