//! Error types for the resound engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the fingerprint engine and its storage layer
#[derive(Error, Debug)]
pub enum Error {
    /// Fingerprint data could not be decoded
    #[error("invalid fingerprint")]
    InvalidFingerprint,

    /// Master and query fingerprints have different or unknown versions
    #[error("invalid fingerprint version")]
    InvalidFingerprintVersion,

    /// Fingerprint exceeds the maximum supported number of frames
    #[error("fingerprint too long")]
    FingerprintTooLong,

    /// Track metadata could not be encoded or decoded
    #[error("invalid metadata: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Underlying storage failure, propagated unchanged
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap an arbitrary backend failure as a storage error
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Storage(Box::new(err))
    }

    /// Create a storage error from a plain message
    pub fn storage_msg<S: Into<String>>(message: S) -> Self {
        Error::Storage(message.into().into())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::storage(err)
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::storage(err)
    }
}
