//! Error types for the local cache.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in the local cache.
///
/// Every storage failure is surfaced to the caller; nothing is silently
/// swallowed. Callers decide whether to retry.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted snapshot could not be decoded.
    #[error("corrupt cache snapshot: {0}")]
    Corrupt(String),

    /// The cache was closed and can no longer be used.
    #[error("cache is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(CacheError::Closed.to_string(), "cache is closed");

        let err = CacheError::Corrupt("truncated".into());
        assert!(err.to_string().contains("truncated"));
    }
}
