//! Ranch archive core types
//!
//! Types for the ranch archive format (.ranchvault.tar.zst)

use chrono::{DateTime, Utc};
use ranchvault_core::{BlobPath, EntityKind, RanchId, RecordId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use xxhash_rust::xxh3::Xxh3;

/// Current archive format version
pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// File extension for ranch archives
pub const ARCHIVE_EXTENSION: &str = ".ranchvault.tar.zst";

/// Checksum algorithm recorded in every manifest
pub const CHECKSUM_ALGORITHM: &str = "xxh3";

/// Archive paths within the container
pub mod paths {
    use ranchvault_core::{BlobPath, EntityKind};

    /// Root directory in the archive
    pub const ROOT: &str = "ranchvault";
    /// Manifest file, always the last entry
    pub const MANIFEST: &str = "ranchvault/MANIFEST.json";
    /// Directory holding one subdirectory per entity section
    pub const SECTIONS: &str = "ranchvault/sections";
    /// Directory mirroring the Blob Store layout
    pub const MEDIA: &str = "ranchvault/media";

    /// Path of batch `seq` in the section for `kind`
    pub fn batch(kind: EntityKind, seq: u32) -> String {
        format!("{}/{}/{:06}.batch", SECTIONS, kind.as_str(), seq)
    }

    /// Path of a media object
    pub fn media(path: &BlobPath) -> String {
        format!("{}/{}", MEDIA, path)
    }

    /// What an archive path refers to
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum EntryPath {
        /// The manifest
        Manifest,
        /// A batch in an entity section
        Batch {
            /// Section
            kind: EntityKind,
            /// Sequence number within the section
            seq: u32,
        },
        /// A media object
        Media(BlobPath),
    }

    /// Classify an archive path, `None` for anything the format does not define
    pub fn parse(path: &str) -> Option<EntryPath> {
        if path == MANIFEST {
            return Some(EntryPath::Manifest);
        }
        if let Some(rest) = path
            .strip_prefix(SECTIONS)
            .and_then(|r| r.strip_prefix('/'))
        {
            let (section, file) = rest.split_once('/')?;
            let kind = EntityKind::parse(section)?;
            let seq = file.strip_suffix(".batch")?;
            if seq.len() != 6 || !seq.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            return Some(EntryPath::Batch {
                kind,
                seq: seq.parse().ok()?,
            });
        }
        let rest = path.strip_prefix(MEDIA)?.strip_prefix('/')?;
        rest.parse().ok().map(EntryPath::Media)
    }
}

/// Magic bytes at the start of every batch file
pub const BATCH_MAGIC: &[u8; 11] = b"RANCH_BATCH";

/// Batch file format version
pub const BATCH_VERSION: u16 = 1;

// =============================================================================
// MANIFEST.json
// =============================================================================

/// Checksum of one media object stored in the archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaChecksum {
    /// Blob path, `<ranch>/<animal>/<filename>`
    pub path: String,
    /// xxh3 hex of the bytes
    pub checksum: String,
    /// Stored length
    pub byte_size: u64,
}

/// A photo whose bytes could not be collected at export time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MissingMedia {
    /// Blob path that was requested
    pub path: String,
    /// Photo row that references it
    pub photo_id: RecordId,
    /// Why it is missing
    pub reason: String,
}

/// Archive manifest - format metadata, counts and checksums
///
/// Written as the final container entry, after every section and media
/// object, so the writer can record checksums computed while streaming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RanchSnapshotManifest {
    /// Format version
    pub format_version: u32,

    /// Engine version that created this archive
    pub engine_version: String,

    /// Ranch the snapshot was taken from
    pub ranch_id: RanchId,

    /// When the export started
    pub exported_at: DateTime<Utc>,

    /// Checksum algorithm used (currently "xxh3")
    pub checksum_algorithm: String,

    /// Section name -> record count
    pub entity_counts: BTreeMap<String, u64>,

    /// Batch path -> xxh3 hex
    pub entity_checksums: BTreeMap<String, String>,

    /// Digest over `entity_checksums`
    pub entity_digest: String,

    /// One entry per stored media object
    #[serde(default)]
    pub media_checksums: Vec<MediaChecksum>,

    /// Photos exported without bytes
    #[serde(default)]
    pub missing_media: Vec<MissingMedia>,
}

impl RanchSnapshotManifest {
    /// Empty manifest for a new archive
    pub fn new(ranch_id: RanchId, exported_at: DateTime<Utc>) -> Self {
        Self {
            format_version: ARCHIVE_FORMAT_VERSION,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            ranch_id,
            exported_at,
            checksum_algorithm: CHECKSUM_ALGORITHM.to_string(),
            entity_counts: EntityKind::ALL
                .iter()
                .map(|k| (k.as_str().to_string(), 0))
                .collect(),
            entity_checksums: BTreeMap::new(),
            entity_digest: entity_digest(&BTreeMap::new()),
            media_checksums: Vec::new(),
            missing_media: Vec::new(),
        }
    }

    /// Record count for one section
    pub fn entity_count(&self, kind: EntityKind) -> u64 {
        self.entity_counts.get(kind.as_str()).copied().unwrap_or(0)
    }

    /// Total records across all sections
    pub fn total_records(&self) -> u64 {
        self.entity_counts.values().sum()
    }

    /// Recompute `entity_digest` from `entity_checksums`
    pub fn seal(&mut self) {
        self.entity_digest = entity_digest(&self.entity_checksums);
    }

    /// Total media bytes stored
    pub fn media_bytes(&self) -> u64 {
        self.media_checksums.iter().map(|m| m.byte_size).sum()
    }
}

/// Digest over ordered `path=checksum` lines
pub fn entity_digest(checksums: &BTreeMap<String, String>) -> String {
    let mut hasher = Xxh3::new();
    for (path, checksum) in checksums {
        hasher.update(path.as_bytes());
        hasher.update(b"=");
        hasher.update(checksum.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:016x}", hasher.digest())
}

// =============================================================================
// Export / Verify Types
// =============================================================================

/// Options for writing an archive
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Zstd compression level (1-22, default: 3)
    pub compression_level: i32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            compression_level: 3,
        }
    }
}

/// A finished archive on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHandle {
    /// Location of the archive
    pub path: PathBuf,
}

impl ArchiveHandle {
    /// Handle for an existing file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Information returned after writing an archive
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    /// Where the archive was written
    pub handle: ArchiveHandle,
    /// Manifest as written
    pub manifest: RanchSnapshotManifest,
    /// Size of the archive file in bytes
    pub bundle_size_bytes: u64,
    /// xxh3 checksum of the entire archive file
    pub checksum: String,
}

/// Information returned after verifying an archive
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveVerifyInfo {
    /// Ranch the archive was exported from
    pub ranch_id: RanchId,
    /// Format version of the archive
    pub format_version: u32,
    /// Section name -> record count
    pub entity_counts: BTreeMap<String, u64>,
    /// Media objects stored
    pub media_count: usize,
    /// Photos exported without bytes
    pub missing_media_count: usize,
    /// Whether all checksums are valid
    pub checksums_valid: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Compute xxh3 hash of data and return as hex string
pub fn xxh3_hex(data: &[u8]) -> String {
    use xxhash_rust::xxh3::xxh3_64;
    format!("{:016x}", xxh3_64(data))
}

/// Writer adapter that hashes and counts everything passing through
pub struct HashingWriter<W> {
    inner: W,
    hasher: Xxh3,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Xxh3::new(),
            written: 0,
        }
    }

    /// Bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Hex digest of everything written
    pub fn checksum(&self) -> String {
        format!("{:016x}", self.hasher.digest())
    }

    /// Unwrap, returning the inner writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Reader adapter that hashes and counts everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: Xxh3,
    read: u64,
}

impl<R: Read> HashingReader<R> {
    /// Wrap `inner`
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Xxh3::new(),
            read: 0,
        }
    }

    /// Bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Hex digest of everything read
    pub fn checksum(&self) -> String {
        format!("{:016x}", self.hasher.digest())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }
}

/// Hash a whole file without loading it into memory
pub fn xxh3_file(path: &std::path::Path) -> io::Result<String> {
    let mut reader = HashingReader::new(std::fs::File::open(path)?);
    io::copy(&mut reader, &mut io::sink())?;
    Ok(reader.checksum())
}
