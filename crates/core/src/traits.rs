//! Collaborator traits for the Record Store and Blob Store
//!
//! The engine never reaches for a shared client; both stores are handed to it
//! as `Arc<dyn RecordStore>` / `Arc<dyn BlobStore>`. Implementations must be
//! safe to call from multiple threads (requires Send + Sync): exports may run
//! alongside a restore.

use std::io::Read;

use crate::error::StoreResult;
use crate::records::{
    AnimalRecord, CustomFieldDefinition, CustomFieldValue, MedicalHistoryRecord, PhotoRecord,
    RanchSettings,
};
use crate::types::{AnimalId, BlobPath, RanchId, RecordId};

/// Keyset pagination request
///
/// Returns rows with an id strictly greater than `after`, ascending, at most
/// `limit` of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Exclusive lower bound on the id; `None` starts at the beginning
    pub after: Option<u64>,
    /// Maximum rows to return
    pub limit: usize,
}

impl PageRequest {
    /// First page of the given size
    pub fn first(limit: usize) -> Self {
        Self { after: None, limit }
    }
}

/// One page of rows
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Rows in ascending id order
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when this was the last one
    pub next: Option<u64>,
}

impl<T> Page<T> {
    /// Request for the page after this one, if any
    pub fn next_request(&self, limit: usize) -> Option<PageRequest> {
        self.next.map(|after| PageRequest {
            after: Some(after),
            limit,
        })
    }
}

/// Relational store holding ranch records
///
/// Every call is scoped to one ranch. Subordinate inserts ignore the incoming
/// `id` and return the id the store assigned; animal inserts keep the given
/// id so the caller controls identity assignment.
pub trait RecordStore: Send + Sync {
    /// Whether the ranch exists
    fn ranch_exists(&self, ranch: RanchId) -> StoreResult<bool>;

    /// Ranch settings, if any were saved
    fn settings(&self, ranch: RanchId) -> StoreResult<Option<RanchSettings>>;

    /// Create or replace the ranch settings
    fn put_settings(&self, ranch: RanchId, settings: &RanchSettings) -> StoreResult<()>;

    /// Page through custom-field definitions
    fn custom_field_definitions(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldDefinition>>;

    /// Page through animals
    fn animals(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<AnimalRecord>>;

    /// Page through medical history
    fn medical_history(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<MedicalHistoryRecord>>;

    /// Page through custom-field values
    fn custom_field_values(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldValue>>;

    /// Page through photo metadata
    fn photos(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<PhotoRecord>>;

    /// Whether an animal with this id exists in the ranch
    fn animal_exists(&self, ranch: RanchId, id: AnimalId) -> StoreResult<bool>;

    /// Whether a custom-field definition with this id exists in the ranch
    fn custom_field_definition_exists(&self, ranch: RanchId, id: RecordId) -> StoreResult<bool>;

    /// Reserve a fresh animal id that no live animal uses
    fn allocate_animal_id(&self, ranch: RanchId) -> StoreResult<AnimalId>;

    /// Insert an animal under `animal.id`
    fn insert_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()>;

    /// Overwrite an existing animal's fields
    fn update_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()>;

    /// Set both parent links of an existing animal
    fn set_animal_parents(
        &self,
        ranch: RanchId,
        id: AnimalId,
        mother: Option<AnimalId>,
        father: Option<AnimalId>,
    ) -> StoreResult<()>;

    /// Insert a custom-field definition under `definition.id`
    fn insert_custom_field_definition(
        &self,
        ranch: RanchId,
        definition: &CustomFieldDefinition,
    ) -> StoreResult<()>;

    /// Insert a medical record, returning the assigned id
    fn insert_medical_record(
        &self,
        ranch: RanchId,
        record: &MedicalHistoryRecord,
    ) -> StoreResult<RecordId>;

    /// Insert a custom-field value, returning the assigned id
    fn insert_custom_field_value(
        &self,
        ranch: RanchId,
        value: &CustomFieldValue,
    ) -> StoreResult<RecordId>;

    /// Insert photo metadata, returning the assigned id
    fn insert_photo(&self, ranch: RanchId, photo: &PhotoRecord) -> StoreResult<RecordId>;

    /// Delete every animal in the ranch together with its medical history,
    /// custom-field values and photo rows. Returns the number of animals
    /// deleted.
    fn delete_all_animals(&self, ranch: RanchId) -> StoreResult<u64>;
}

/// Streaming read handle for one blob
pub struct BlobStream {
    /// Length in bytes as reported by the store
    pub len: u64,
    /// Byte stream
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for BlobStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStream").field("len", &self.len).finish()
    }
}

/// Object store holding media bytes, keyed by [`BlobPath`]
pub trait BlobStore: Send + Sync {
    /// Open a streaming read of the object
    fn get(&self, path: &BlobPath) -> StoreResult<BlobStream>;

    /// Store `len` bytes read from `reader`, replacing any existing object.
    /// Returns the number of bytes written.
    fn put(&self, path: &BlobPath, reader: &mut dyn Read, len: u64) -> StoreResult<u64>;
}
