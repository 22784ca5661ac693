//! Cache error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to serialize or deserialize cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
