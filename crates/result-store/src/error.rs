use common::InstanceId;
use thiserror::Error;

/// Errors that can occur when interacting with the result store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An active (non-terminal) instance already exists for the business
    /// key being inserted.
    #[error("duplicate business key '{0}': an active saga instance already exists")]
    DuplicateBusinessKey(String),

    /// The instance being updated does not exist.
    #[error("saga instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// A persisted value could not be interpreted.
    #[error("invalid stored value: {0}")]
    InvalidStoredValue(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
