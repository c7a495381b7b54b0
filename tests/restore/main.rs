//! Export/restore integration suite
//!
//! Runs full exports and restores against the in-memory stores and the
//! fault-injecting wrappers.

#[path = "../common/mod.rs"]
mod common;

mod cancellation;
mod idempotence;
mod locking;
mod media_failures;
mod policies;
mod referential;
mod scenarios;
mod store_retry;
mod validation;
