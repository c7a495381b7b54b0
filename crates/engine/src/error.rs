//! Engine error type
//!
//! `VaultError` is what every export, restore and verify call returns. The
//! domain errors from `ranchvault-core` and the archive crate convert into it
//! with `?`.

use ranchvault_archive::ArchiveFormatError;
use ranchvault_core::{
    ExportError, RanchId, ReconciliationError, RestoreLockError, StoreError,
};
use std::io;
use thiserror::Error;

/// Errors raised by the Snapshot Builder and Restore Orchestrator
#[derive(Debug, Error)]
pub enum VaultError {
    /// Export could not produce an archive
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Archive failed validation or could not be written
    #[error(transparent)]
    ArchiveFormat(#[from] ArchiveFormatError),

    /// Archive content cannot be reconciled into the target ranch
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    /// Another restore holds the ranch
    #[error(transparent)]
    RestoreLock(#[from] RestoreLockError),

    /// Restore target does not exist
    #[error("Target ranch not found: {0}")]
    TargetRanchNotFound(RanchId),

    /// Store call failed after retries
    #[error("Store error during {context}: {source}")]
    Store {
        /// What was being done
        context: String,
        /// Last error seen
        #[source]
        source: StoreError,
    },

    /// Configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error outside the archive format
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Operation was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl VaultError {
    /// Create a store error with context
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for failures raised before the target ranch was touched
    ///
    /// Archive and reconciliation problems, lock contention and a missing
    /// target are all detected during validation.
    pub fn is_pre_mutation(&self) -> bool {
        matches!(
            self,
            VaultError::ArchiveFormat(_)
                | VaultError::Reconciliation(_)
                | VaultError::RestoreLock(_)
                | VaultError::TargetRanchNotFound(_)
        )
    }
}

/// Result type for engine operations
pub type VaultResult<T> = Result<T, VaultError>;
