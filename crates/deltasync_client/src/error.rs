//! Client error types.

use deltasync_cache::CacheError;
use thiserror::Error;

/// Errors surfaced by the sync client.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The transport failed before a server verdict was reached.
    ///
    /// A retryable failure (connection refused, timeout) leaves the affected
    /// transaction in the offline queue for a later flush; a fatal one
    /// (malformed endpoint, TLS misconfiguration) does too, but signals that
    /// retrying without intervention is pointless.
    #[error("transport failure: {message}")]
    Transport {
        /// Human-readable failure description.
        message: String,
        /// Whether a later retry can reasonably succeed.
        retryable: bool,
    },

    /// The server rejected the transaction.
    ///
    /// Rejection is a verdict, not a failure: the optimistic change has been
    /// reverted and the transaction removed from the queue.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The local cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The server answered with a body the client could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport failure.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a fatal transport failure.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }
}

/// Convenience alias for client results.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(SyncError::transport_retryable("timeout").is_retryable());
        assert!(!SyncError::transport_fatal("bad url").is_retryable());
        assert!(!SyncError::Rejected("nope".into()).is_retryable());
        assert!(!SyncError::Protocol("garbage".into()).is_retryable());
    }

    #[test]
    fn cache_error_converts() {
        let err: SyncError = CacheError::Closed.into();
        assert!(matches!(err, SyncError::Cache(CacheError::Closed)));
    }
}
