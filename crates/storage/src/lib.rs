//! Store collaborators for RanchVault
//!
//! This crate implements the Record Store and Blob Store interfaces defined in
//! `ranchvault-core`:
//! - MemoryRecordStore: per-ranch BTreeMap tables behind a RwLock
//! - MemoryBlobStore: DashMap of shared byte buffers
//! - FsBlobStore: directory tree mirroring the `ranch/animal/filename` layout
//! - testing: fault-injecting wrappers for both store traits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blob;
pub mod memory;
pub mod testing;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use memory::MemoryRecordStore;
