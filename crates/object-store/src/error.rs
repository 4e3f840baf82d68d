//! Error types for the blob store.

/// Errors that can occur when working with the blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Object storage error
    #[error("object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Metadata (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object not found
    #[error("object not found: {0}")]
    NotFound(String),

    /// Object already exists
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// Requested byte range lies outside the object
    #[error("invalid range for {name}: offset {offset}, length {length}, size {size}")]
    InvalidRange {
        name: String,
        offset: u64,
        length: u64,
        size: u64,
    },

    /// Object is leased by another writer
    #[error("object is under lease: {0}")]
    LeaseConflict(String),

    /// Caller is not allowed to perform the operation
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Block identifier is malformed or inconsistent with the object's other ids
    #[error("invalid block id for {name}: {id}")]
    InvalidBlockId { name: String, id: String },

    /// Commit referenced a block that is neither staged nor committed
    #[error("invalid block list for {name}: unknown block {id}")]
    InvalidBlockList { name: String, id: String },

    /// Payload or block count exceeds service limits
    #[error("request too large: {0}")]
    TooLarge(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// S3 bucket not found - must be created before use
    #[error("S3 bucket '{0}' does not exist. Create it before starting.")]
    BucketNotFound(String),
}

/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;
