//! Archive format error types

use std::io;
use thiserror::Error;

/// Errors raised while writing or reading a ranch archive
///
/// Any of these surfacing from the reader means the archive must not be
/// applied to a live ranch.
#[derive(Debug, Error)]
pub enum ArchiveFormatError {
    /// Invalid archive structure
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// Required file missing from the archive
    #[error("Missing required file in archive: {0}")]
    MissingFile(String),

    /// Archive ends early: the final manifest entry or part of an entry is absent
    #[error("Truncated archive: {0}")]
    Truncated(String),

    /// Checksum verification failed
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that failed checksum
        file: String,
        /// Expected checksum value
        expected: String,
        /// Actual computed checksum
        actual: String,
    },

    /// Manifest digest does not cover the entity checksums it lists
    #[error("Manifest digest mismatch: expected {expected}, got {actual}")]
    ManifestDigestMismatch {
        /// Digest stored in the manifest
        expected: String,
        /// Digest recomputed from the listed checksums
        actual: String,
    },

    /// Record count in a section differs from the manifest
    #[error("Record count mismatch for {section}: manifest says {expected}, archive holds {actual}")]
    CountMismatch {
        /// Section name
        section: String,
        /// Count from the manifest
        expected: u64,
        /// Count found while reading
        actual: u64,
    },

    /// Unsupported archive format version
    #[error("Unsupported format version: {version}. Supported: {supported}")]
    UnsupportedVersion {
        /// The unsupported version number
        version: u32,
        /// The version this build reads
        supported: u32,
    },

    /// Batch entry is malformed
    #[error("Invalid batch {path}: {reason}")]
    InvalidBatch {
        /// Archive path of the batch
        path: String,
        /// Description of the problem
        reason: String,
    },

    /// Entries are not in section order
    #[error("Out of order entry {path}: {reason}")]
    OutOfOrder {
        /// Archive path of the offending entry
        path: String,
        /// What order was expected
        reason: String,
    },

    /// Archive operation failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Compression/decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Msgpack encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveFormatError {
    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a compression error
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an invalid archive error
    pub fn invalid_archive(msg: impl Into<String>) -> Self {
        Self::InvalidArchive(msg.into())
    }

    /// Create a missing file error
    pub fn missing_file(path: impl Into<String>) -> Self {
        Self::MissingFile(path.into())
    }

    /// Create a truncation error
    pub fn truncated(msg: impl Into<String>) -> Self {
        Self::Truncated(msg.into())
    }

    /// Map a read failure inside the compressed stream.
    ///
    /// An unexpected EOF or an incomplete zstd frame means the container was
    /// cut short; everything else is reported as a plain archive error.
    pub fn from_stream(context: &str, err: io::Error) -> Self {
        let msg = err.to_string();
        if err.kind() == io::ErrorKind::UnexpectedEof || msg.contains("incomplete") {
            Self::Truncated(format!("{}: {}", context, msg))
        } else {
            Self::Archive(format!("{}: {}", context, msg))
        }
    }
}

/// Result type for archive operations
pub type ArchiveResult<T> = Result<T, ArchiveFormatError>;
