//! Sync error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while reading, writing or synchronizing a Research Object.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A local or remote resource, annotation or RO does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote service could not be reached.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Checkout target or local RO already exists.
    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// One or more plan items failed while the rest of the plan was applied.
    #[error("Completed with {failed} failure(s) out of {total} operation(s)")]
    PartialSync {
        /// Number of failed items.
        failed: usize,
        /// Number of attempted items.
        total: usize,
    },

    /// The remote service rejected the access token.
    #[error("Authentication rejected by {0}")]
    Unauthorized(String),

    /// The remote service answered with an unexpected status.
    #[error("Remote returned {status} for {uri}: {message}")]
    Remote {
        status: u16,
        uri: String,
        message: String,
    },

    /// An item did not complete within the configured timeout.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A resource identifier is not a valid relative path.
    #[error("Invalid resource identifier '{id}': {reason}")]
    InvalidIdentifier { id: String, reason: &'static str },

    /// An annotation refers to a resource that is not aggregated.
    #[error("Annotation subject '{0}' is not an aggregated resource")]
    InvalidSubject(String),

    /// An annotation was skipped because its subject did not transfer.
    #[error("Subject '{0}' was not transferred")]
    SubjectUnavailable(String),

    /// Local filesystem error.
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read or write a JSON metadata file.
    #[error("Failed to parse {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The operation was cancelled before the item was dispatched.
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors that abort a whole push or checkout rather
    /// than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Unauthorized(_))
    }

    /// Returns true if the error means the target is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
