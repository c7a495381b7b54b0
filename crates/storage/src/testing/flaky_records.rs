//! Record Store wrapper that fails paged reads transiently

use ranchvault_core::{
    AnimalId, AnimalRecord, CustomFieldDefinition, CustomFieldValue, MedicalHistoryRecord,
    Page, PageRequest, PhotoRecord, RanchId, RanchSettings, RecordId, RecordStore, StoreError,
    StoreResult,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// [`RecordStore`] wrapper whose paged reads fail with transient errors
///
/// `fail_next_reads(n)` makes the next `n` paged reads fail; `fail_all_reads`
/// makes every paged read fail. Writes always pass through.
pub struct FlakyRecordStore<S> {
    inner: S,
    pending_failures: AtomicUsize,
    always_fail: AtomicBool,
    read_calls: AtomicUsize,
}

impl<S: RecordStore> FlakyRecordStore<S> {
    /// Wrap a store with no faults configured
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending_failures: AtomicUsize::new(0),
            always_fail: AtomicBool::new(false),
            read_calls: AtomicUsize::new(0),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next `n` paged reads
    pub fn fail_next_reads(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Fail every paged read from now on
    pub fn fail_all_reads(&self) {
        self.always_fail.store(true, Ordering::SeqCst);
    }

    /// Paged reads attempted so far
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    fn gate(&self, what: &str) -> StoreResult<()> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(StoreError::transient(format!("injected failure reading {}", what)));
        }
        let took = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            Err(StoreError::transient(format!("injected failure reading {}", what)))
        } else {
            Ok(())
        }
    }
}

impl<S: RecordStore> RecordStore for FlakyRecordStore<S> {
    fn ranch_exists(&self, ranch: RanchId) -> StoreResult<bool> {
        self.inner.ranch_exists(ranch)
    }

    fn settings(&self, ranch: RanchId) -> StoreResult<Option<RanchSettings>> {
        self.gate("settings")?;
        self.inner.settings(ranch)
    }

    fn put_settings(&self, ranch: RanchId, settings: &RanchSettings) -> StoreResult<()> {
        self.inner.put_settings(ranch, settings)
    }

    fn custom_field_definitions(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldDefinition>> {
        self.gate("custom_field_definitions")?;
        self.inner.custom_field_definitions(ranch, page)
    }

    fn animals(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<AnimalRecord>> {
        self.gate("animals")?;
        self.inner.animals(ranch, page)
    }

    fn medical_history(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<MedicalHistoryRecord>> {
        self.gate("medical_history")?;
        self.inner.medical_history(ranch, page)
    }

    fn custom_field_values(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldValue>> {
        self.gate("custom_field_values")?;
        self.inner.custom_field_values(ranch, page)
    }

    fn photos(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<PhotoRecord>> {
        self.gate("photos")?;
        self.inner.photos(ranch, page)
    }

    fn animal_exists(&self, ranch: RanchId, id: AnimalId) -> StoreResult<bool> {
        self.inner.animal_exists(ranch, id)
    }

    fn custom_field_definition_exists(&self, ranch: RanchId, id: RecordId) -> StoreResult<bool> {
        self.inner.custom_field_definition_exists(ranch, id)
    }

    fn allocate_animal_id(&self, ranch: RanchId) -> StoreResult<AnimalId> {
        self.inner.allocate_animal_id(ranch)
    }

    fn insert_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()> {
        self.inner.insert_animal(ranch, animal)
    }

    fn update_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()> {
        self.inner.update_animal(ranch, animal)
    }

    fn set_animal_parents(
        &self,
        ranch: RanchId,
        id: AnimalId,
        mother: Option<AnimalId>,
        father: Option<AnimalId>,
    ) -> StoreResult<()> {
        self.inner.set_animal_parents(ranch, id, mother, father)
    }

    fn insert_custom_field_definition(
        &self,
        ranch: RanchId,
        definition: &CustomFieldDefinition,
    ) -> StoreResult<()> {
        self.inner.insert_custom_field_definition(ranch, definition)
    }

    fn insert_medical_record(
        &self,
        ranch: RanchId,
        record: &MedicalHistoryRecord,
    ) -> StoreResult<RecordId> {
        self.inner.insert_medical_record(ranch, record)
    }

    fn insert_custom_field_value(
        &self,
        ranch: RanchId,
        value: &CustomFieldValue,
    ) -> StoreResult<RecordId> {
        self.inner.insert_custom_field_value(ranch, value)
    }

    fn insert_photo(&self, ranch: RanchId, photo: &PhotoRecord) -> StoreResult<RecordId> {
        self.inner.insert_photo(ranch, photo)
    }

    fn delete_all_animals(&self, ranch: RanchId) -> StoreResult<u64> {
        self.inner.delete_all_animals(ranch)
    }
}
