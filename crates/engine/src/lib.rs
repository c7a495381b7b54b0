//! Export and restore engine for RanchVault
//!
//! This crate drives the export and restore flows:
//! - SnapshotBuilder: pages a ranch out of the Record Store into an archive
//! - MediaCollector: streams photo bytes from the Blob Store into the archive
//! - ReconciliationMap: maps archived identities onto a live ranch
//! - RestoreOrchestrator: validates, reconciles and applies an archive
//!
//! Both flows take their stores as `Arc<dyn RecordStore>` / `Arc<dyn
//! BlobStore>`, report progress through a [`ProgressSink`] and stop at the
//! next batch or media boundary once their [`CancellationToken`] fires.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod lock;
mod media;
pub mod progress;
pub mod reconcile;
pub mod restore;
pub mod retry;
pub mod snapshot;

pub use cancel::CancellationToken;
pub use config::{CollisionPolicy, RetryConfig, VaultConfig, CONFIG_FILE_NAME};
pub use error::{VaultError, VaultResult};
pub use lock::{RanchLockGuard, RanchLocks};
pub use progress::{NoProgress, Phase, ProgressSink};
pub use reconcile::{ArchiveIndex, Attachment, ReconciliationMap, ReconciliationStats, Resolution};
pub use restore::{RestoreMode, RestoreOptions, RestoreOrchestrator, RestoreSummary};
pub use retry::{with_retry, RetryExhausted};
pub use snapshot::{ExportReport, SnapshotBuilder};
