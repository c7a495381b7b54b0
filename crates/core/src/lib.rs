//! Core types and traits for RanchVault
//!
//! This crate defines the foundational types used throughout the system:
//! - Identifiers: RanchId, AnimalId, RecordId
//! - BlobPath: the `ranch/animal/filename` media key
//! - Records: animals, medical history, custom fields, photos, settings
//! - EntityKind: entity types in archive order
//! - Errors: store errors and the engine's domain error taxonomy
//! - Traits: RecordStore and BlobStore collaborator interfaces

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod records;
pub mod traits;
pub mod types;

pub use error::{
    ExportError, MediaTransferError, ReconciliationError, RestoreLockError, StoreError,
    StoreResult,
};
pub use records::{
    AnimalRecord, AnimalStatus, CustomFieldDefinition, CustomFieldValue, EntityKind, FieldType,
    MedicalHistoryRecord, PhotoRecord, RanchSettings, Sex,
};
pub use traits::{BlobStore, BlobStream, Page, PageRequest, RecordStore};
pub use types::{AnimalId, BlobPath, BlobPathError, RanchId, RecordId};
