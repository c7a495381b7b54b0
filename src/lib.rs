//! RanchVault - portable snapshot export and reconciling restore for ranches
//!
//! A ranch's records (settings, custom-field definitions, animals, medical
//! history, custom-field values, photo metadata) and its photo bytes are
//! exported into one self-describing `.ranchvault.tar.zst` archive, and an
//! archive can be restored into any ranch, either alongside the animals
//! already there or in place of them.
//!
//! # Quick Start
//!
//! ```ignore
//! use ranchvault::{
//!     CancellationToken, NoProgress, RanchId, RestoreOptions, RestoreOrchestrator,
//!     SnapshotBuilder, VaultConfig,
//! };
//!
//! let builder = SnapshotBuilder::new(records.clone(), blobs.clone(), VaultConfig::default());
//! let report = builder.export(RanchId(1), "ranch-1.ranchvault.tar.zst".as_ref(), &mut NoProgress, &CancellationToken::new())?;
//!
//! let restore = RestoreOrchestrator::new(records, blobs, VaultConfig::default());
//! let summary = restore.restore(
//!     &report.handle,
//!     RestoreOptions::missing(RanchId(2)),
//!     &mut |msg: &str| println!("{}", msg),
//!     &CancellationToken::new(),
//! )?;
//! ```
//!
//! # Architecture
//!
//! - `ranchvault-core`: identifiers, records, error taxonomy, store traits
//! - `ranchvault-storage`: in-memory and filesystem stores, fault injectors
//! - `ranchvault-archive`: the archive container, writer and verifying reader
//! - `ranchvault-engine`: Snapshot Builder, Media Collector, ID
//!   Reconciliation Map, Restore Orchestrator

pub use ranchvault_archive::{
    ArchiveFormatError, ArchiveHandle, ArchiveReader, ArchiveVerifyInfo, MediaChecksum,
    MissingMedia, RanchSnapshotManifest, ARCHIVE_EXTENSION, ARCHIVE_FORMAT_VERSION,
};
pub use ranchvault_core::*;
pub use ranchvault_engine::{
    CancellationToken, CollisionPolicy, ExportReport, NoProgress, Phase, ProgressSink,
    RanchLocks, RestoreMode, RestoreOptions, RestoreOrchestrator, RestoreSummary, RetryConfig,
    SnapshotBuilder, VaultConfig, VaultError, VaultResult,
};
pub use ranchvault_storage::{testing, FsBlobStore, MemoryBlobStore, MemoryRecordStore};
