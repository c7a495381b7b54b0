//! Fault injection for store collaborators
//!
//! Wrappers around any [`RecordStore`](ranchvault_core::RecordStore) or
//! [`BlobStore`](ranchvault_core::BlobStore) that fail selected calls, so the
//! engine's retry and media-isolation paths can be exercised without a real
//! flaky backend.
//!
//! # Example
//!
//! ```ignore
//! use ranchvault_storage::testing::FaultyBlobStore;
//!
//! let blobs = FaultyBlobStore::new(MemoryBlobStore::new());
//! blobs.fail_put_always("1/2/calf.jpg");
//! blobs.fail_get("1/3/cow.jpg");
//! ```

mod faulty_blob;
mod flaky_records;

pub use faulty_blob::FaultyBlobStore;
pub use flaky_records::FlakyRecordStore;
