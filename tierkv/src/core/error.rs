use thiserror::Error;

/// Main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Encode failed for key {key}: {reason}")]
    EncodeFailure { key: String, reason: String },

    /// Never returned from a read; undecodable payloads are reported as a miss
    #[error("Decode failed for key {key}: {reason}")]
    DecodeFailure { key: String, reason: String },

    #[error("Disk I/O failed for {namespace}:{key}: {source}")]
    DiskIo {
        namespace: String,
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Saved {saved} keys, {} failed", .failures.len())]
    SaveAllFailed {
        saved: usize,
        failures: Vec<(String, StorageError)>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// True when the failure came from the disk store rather than the codec
    pub fn is_disk_failure(&self) -> bool {
        match self {
            Self::DiskIo { .. } => true,
            Self::SaveAllFailed { failures, .. } => failures.iter().any(|(_, e)| e.is_disk_failure()),
            _ => false,
        }
    }
}

/// Failure raised by a serializer or deserializer
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("bincode encode: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),

    #[error("bincode decode: {0}")]
    BincodeDecode(#[from] bincode::error::DecodeError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;
