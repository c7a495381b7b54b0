//! Error types shared across the workspace
//!
//! The Record Store and Blob Store collaborators report [`StoreError`]. The
//! engine's domain failures are separate types so callers can match on them
//! directly:
//!
//! - [`ExportError`]: the snapshot could not be taken
//! - [`ReconciliationError`]: archive content the null-out policy cannot absorb
//! - [`RestoreLockError`]: another restore holds the ranch
//! - [`MediaTransferError`]: one media item failed (never fatal, only counted)
//!
//! Archive format failures live next to the format, in `ranchvault-archive`.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::records::EntityKind;
use crate::types::{AnimalId, BlobPath, RanchId};

/// Result alias for store collaborator calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a Record Store or Blob Store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested row or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Temporary failure; the same call may succeed if retried
    #[error("Transient store error: {0}")]
    Transient(String),

    /// Store refused the write (size or type limit, constraint)
    #[error("Rejected by store: {0}")]
    Rejected(String),

    /// I/O failure in a file-backed store
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Any other backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a rejection error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Export could not produce an archive
#[derive(Debug, Error)]
pub enum ExportError {
    /// The ranch is unknown to the Record Store
    #[error("Ranch not found: {0}")]
    RanchNotFound(RanchId),

    /// A store read kept failing after the configured retries
    #[error("Store unavailable while reading {what} after {attempts} attempt(s): {source}")]
    StoreUnavailable {
        /// What was being read
        what: String,
        /// Attempts made, including the first
        attempts: usize,
        /// Last error seen
        #[source]
        source: StoreError,
    },

    /// Writing or renaming the archive file failed
    #[error("Failed to write archive {}: {source}", path.display())]
    ArchiveWrite {
        /// Destination of the export
        path: PathBuf,
        /// Underlying container or filesystem error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Archive content that cannot be reconciled into a ranch
#[derive(Debug, Error)]
pub enum ReconciliationError {
    /// The same identifier appears twice for one entity type
    #[error("Duplicate {kind} identifier {id} in archive")]
    DuplicateIdentifier {
        /// Entity type
        kind: EntityKind,
        /// Repeated identifier
        id: u64,
    },

    /// Collision policy is `fail` and a live animal already uses this id
    #[error("Animal {id} already exists in ranch {ranch}")]
    IdentityConflict {
        /// Target ranch
        ranch: RanchId,
        /// Colliding identifier
        id: AnimalId,
    },

    /// Settings section holds more than one row
    #[error("Archive contains {0} settings rows, expected at most 1")]
    MultipleSettings(usize),
}

/// Another restore already holds the ranch
#[derive(Debug, Error)]
#[error("Restore already in progress for ranch {ranch}")]
pub struct RestoreLockError {
    /// Locked ranch
    pub ranch: RanchId,
}

/// One media item could not be transferred; counted, never fatal
#[derive(Debug, Clone, Error, serde::Serialize)]
#[error("Media transfer failed for {path} after {attempts} attempt(s): {reason}")]
pub struct MediaTransferError {
    /// Blob path that failed
    pub path: String,
    /// Attempts made; media rejected before any upload counts its one read
    pub attempts: usize,
    /// Last failure, rendered
    pub reason: String,
}

impl MediaTransferError {
    /// Build from a path and the last error seen
    pub fn new(path: &BlobPath, attempts: usize, reason: impl ToString) -> Self {
        Self {
            path: path.to_string(),
            attempts,
            reason: reason.to_string(),
        }
    }
}
