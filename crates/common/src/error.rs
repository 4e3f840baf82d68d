use object_store::BlobStoreError;

/// Errors surfaced by the filesystem engine.
///
/// Backend taxonomy errors are mapped one-to-one onto the matching
/// variant; infrastructure faults pass through as [`EngineError::Backend`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("lease conflict: {0}")]
    LeaseConflict(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("block size {block_size} exceeds the per-block maximum of {max} bytes")]
    BlockSizeExceeded { block_size: u64, max: u64 },
    #[error("object size {size} exceeds the maximum of {max} bytes")]
    ObjectTooLarge { size: u64, max: u64 },
    #[error("object would need {blocks} blocks, more than the maximum of {max}")]
    TooManyBlocks { blocks: u64, max: u64 },
    #[error("operation not supported: {0}")]
    NotSupported(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("backend error: {0}")]
    Backend(BlobStoreError),
}

impl From<BlobStoreError> for EngineError {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::NotFound(name) => EngineError::NotFound(name),
            BlobStoreError::AlreadyExists(name) => EngineError::AlreadyExists(name),
            e @ BlobStoreError::InvalidRange { .. } => EngineError::InvalidRange(e.to_string()),
            BlobStoreError::LeaseConflict(name) => EngineError::LeaseConflict(name),
            BlobStoreError::PermissionDenied(msg) => EngineError::PermissionDenied(msg),
            other => EngineError::Backend(other),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl EngineError {
    /// POSIX error number reported to the file-system caller.
    pub fn errno(&self) -> i32 {
        match self {
            EngineError::NotFound(_) => libc::ENOENT,
            EngineError::AlreadyExists(_) => libc::EEXIST,
            EngineError::InvalidRange(_) => libc::ERANGE,
            EngineError::LeaseConflict(_) => libc::EIO,
            EngineError::PermissionDenied(_) => libc::EACCES,
            EngineError::BlockSizeExceeded { .. }
            | EngineError::ObjectTooLarge { .. }
            | EngineError::TooManyBlocks { .. } => libc::EFBIG,
            EngineError::NotSupported(_) => libc::ENOTSUP,
            EngineError::InvalidArgument(_) | EngineError::Config(_) => libc::EINVAL,
            EngineError::Backend(_) => libc::EIO,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}
