//! Ranch archive container format
//!
//! A ranch archive is a zstd-compressed tar file (`.ranchvault.tar.zst`):
//!
//! ```text
//! ranchvault/
//! ├── sections/<section>/<seq>.batch   one batch per store page, section order
//! ├── media/<ranch>/<animal>/<filename> raw media bytes
//! └── MANIFEST.json                     counts and checksums, final entry
//! ```
//!
//! [`ArchiveFileWriter`] streams entries into a temp file and renames it into
//! place; [`ArchiveReader::open`] verifies the whole container before
//! [`ArchiveReader::scan`] yields anything.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod error;
pub mod reader;
pub mod types;
pub mod writer;

pub use batch::{decode_batch, encode_batch, BatchRecords, EntityBatch};
pub use error::{ArchiveFormatError, ArchiveResult};
pub use reader::{ArchiveItem, ArchiveReader, MediaEntry, ScanControl, ScanOutcome};
pub use types::{
    paths, xxh3_hex, ArchiveHandle, ArchiveInfo, ArchiveVerifyInfo, ExportOptions, HashingReader,
    HashingWriter, MediaChecksum, MissingMedia, RanchSnapshotManifest, ARCHIVE_EXTENSION,
    ARCHIVE_FORMAT_VERSION,
};
pub use writer::{write_to_vec, ArchiveFileWriter, ArchiveWriter};
