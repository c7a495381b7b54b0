//! In-memory Record Store
//!
//! Per-ranch tables behind one `parking_lot::RwLock`. Tables are `BTreeMap`s
//! keyed by raw id so keyset pagination is a range scan. Used by tests and by
//! embedders that do not have a relational backend.
//!
//! Foreign keys are enforced the way the live store does: subordinate rows
//! must point at an existing animal, and deleting animals cascades.
//!
//! [`MemoryRecordStore::save`] and [`MemoryRecordStore::load`] persist the
//! whole store as one JSON file, which is what the CLI works against.

use parking_lot::RwLock;
use ranchvault_core::{
    AnimalId, AnimalRecord, CustomFieldDefinition, CustomFieldValue, MedicalHistoryRecord,
    Page, PageRequest, PhotoRecord, RanchId, RanchSettings, RecordId, RecordStore, StoreError,
    StoreResult,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Bound;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RanchTables {
    settings: Option<RanchSettings>,
    definitions: BTreeMap<u64, CustomFieldDefinition>,
    animals: BTreeMap<u64, AnimalRecord>,
    medical: BTreeMap<u64, MedicalHistoryRecord>,
    values: BTreeMap<u64, CustomFieldValue>,
    photos: BTreeMap<u64, PhotoRecord>,
    /// Next id handed out by `allocate_animal_id`
    next_animal_id: u64,
    /// Next id for subordinate rows (shared across types)
    next_record_id: u64,
}

impl RanchTables {
    fn require_animal(&self, id: AnimalId) -> StoreResult<()> {
        if self.animals.contains_key(&id.0) {
            Ok(())
        } else {
            Err(StoreError::rejected(format!(
                "foreign key violation: animal {} does not exist",
                id
            )))
        }
    }

    fn take_record_id(&mut self) -> RecordId {
        let floor = [
            self.medical.keys().next_back(),
            self.values.keys().next_back(),
            self.photos.keys().next_back(),
        ]
        .into_iter()
        .flatten()
        .max()
        .map_or(1, |max| max + 1);
        let id = self.next_record_id.max(floor);
        self.next_record_id = id + 1;
        RecordId(id)
    }
}

/// One ranch in the saved file
#[derive(Serialize, Deserialize)]
struct SavedRanch {
    ranch: RanchId,
    tables: RanchTables,
}

/// Thread-safe in-memory implementation of [`RecordStore`]
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    ranches: RwLock<FxHashMap<RanchId, RanchTables>>,
}

impl MemoryRecordStore {
    /// Create an empty store with no ranches
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ranch; no-op if it already exists
    pub fn create_ranch(&self, ranch: RanchId) {
        self.ranches.write().entry(ranch).or_default();
    }

    /// All animals of a ranch, ascending by id
    pub fn all_animals(&self, ranch: RanchId) -> Vec<AnimalRecord> {
        self.read_table(ranch, |t| t.animals.values().cloned().collect())
    }

    /// All medical records of a ranch
    pub fn all_medical_history(&self, ranch: RanchId) -> Vec<MedicalHistoryRecord> {
        self.read_table(ranch, |t| t.medical.values().cloned().collect())
    }

    /// All custom-field values of a ranch
    pub fn all_custom_field_values(&self, ranch: RanchId) -> Vec<CustomFieldValue> {
        self.read_table(ranch, |t| t.values.values().cloned().collect())
    }

    /// All custom-field definitions of a ranch
    pub fn all_custom_field_definitions(&self, ranch: RanchId) -> Vec<CustomFieldDefinition> {
        self.read_table(ranch, |t| t.definitions.values().cloned().collect())
    }

    /// All photo rows of a ranch
    pub fn all_photos(&self, ranch: RanchId) -> Vec<PhotoRecord> {
        self.read_table(ranch, |t| t.photos.values().cloned().collect())
    }

    /// Read a store written by [`MemoryRecordStore::save`]
    pub fn load(path: &Path) -> StoreResult<Self> {
        let bytes = fs::read(path)?;
        let saved: Vec<SavedRanch> = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Backend(format!("invalid store file {}: {}", path.display(), e))
        })?;
        let ranches = saved
            .into_iter()
            .map(|entry| (entry.ranch, entry.tables))
            .collect::<FxHashMap<_, _>>();
        debug!(
            target: "ranchvault::store",
            path = %path.display(),
            ranches = ranches.len(),
            "Record store loaded"
        );
        Ok(Self {
            ranches: RwLock::new(ranches),
        })
    }

    /// Write every ranch to `path` as JSON
    ///
    /// Goes through a `.tmp` sibling so a crash never leaves a half-written
    /// file in place.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let mut saved: Vec<SavedRanch> = self
            .ranches
            .read()
            .iter()
            .map(|(ranch, tables)| SavedRanch {
                ranch: *ranch,
                tables: tables.clone(),
            })
            .collect();
        saved.sort_by_key(|entry| entry.ranch.0);
        let json = serde_json::to_vec_pretty(&saved)
            .map_err(|e| StoreError::Backend(format!("serialize store: {}", e)))?;

        let temp = path.with_extension("tmp");
        let mut file = fs::File::create(&temp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)?;
        debug!(
            target: "ranchvault::store",
            path = %path.display(),
            ranches = saved.len(),
            "Record store saved"
        );
        Ok(())
    }

    fn read_table<T>(&self, ranch: RanchId, f: impl FnOnce(&RanchTables) -> Vec<T>) -> Vec<T> {
        self.ranches.read().get(&ranch).map(f).unwrap_or_default()
    }

    fn with_ranch<T>(
        &self,
        ranch: RanchId,
        f: impl FnOnce(&RanchTables) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let guard = self.ranches.read();
        let tables = guard
            .get(&ranch)
            .ok_or_else(|| StoreError::not_found(format!("ranch {}", ranch)))?;
        f(tables)
    }

    fn with_ranch_mut<T>(
        &self,
        ranch: RanchId,
        f: impl FnOnce(&mut RanchTables) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.ranches.write();
        let tables = guard
            .get_mut(&ranch)
            .ok_or_else(|| StoreError::not_found(format!("ranch {}", ranch)))?;
        f(tables)
    }
}

/// Keyset page over an id-ordered table
fn page_of<T: Clone>(table: &BTreeMap<u64, T>, request: PageRequest) -> Page<T> {
    let lower = match request.after {
        Some(after) => Bound::Excluded(after),
        None => Bound::Unbounded,
    };
    let limit = request.limit.max(1);
    let rows: Vec<(u64, T)> = table
        .range((lower, Bound::Unbounded))
        .take(limit)
        .map(|(id, row)| (*id, row.clone()))
        .collect();

    let next = rows.last().and_then(|(last, _)| {
        table
            .range((Bound::Excluded(*last), Bound::Unbounded))
            .next()
            .map(|_| *last)
    });

    Page {
        items: rows.into_iter().map(|(_, row)| row).collect(),
        next,
    }
}

impl RecordStore for MemoryRecordStore {
    fn ranch_exists(&self, ranch: RanchId) -> StoreResult<bool> {
        Ok(self.ranches.read().contains_key(&ranch))
    }

    fn settings(&self, ranch: RanchId) -> StoreResult<Option<RanchSettings>> {
        self.with_ranch(ranch, |t| Ok(t.settings.clone()))
    }

    fn put_settings(&self, ranch: RanchId, settings: &RanchSettings) -> StoreResult<()> {
        self.with_ranch_mut(ranch, |t| {
            t.settings = Some(settings.clone());
            Ok(())
        })
    }

    fn custom_field_definitions(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldDefinition>> {
        self.with_ranch(ranch, |t| Ok(page_of(&t.definitions, page)))
    }

    fn animals(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<AnimalRecord>> {
        self.with_ranch(ranch, |t| Ok(page_of(&t.animals, page)))
    }

    fn medical_history(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<MedicalHistoryRecord>> {
        self.with_ranch(ranch, |t| Ok(page_of(&t.medical, page)))
    }

    fn custom_field_values(
        &self,
        ranch: RanchId,
        page: PageRequest,
    ) -> StoreResult<Page<CustomFieldValue>> {
        self.with_ranch(ranch, |t| Ok(page_of(&t.values, page)))
    }

    fn photos(&self, ranch: RanchId, page: PageRequest) -> StoreResult<Page<PhotoRecord>> {
        self.with_ranch(ranch, |t| Ok(page_of(&t.photos, page)))
    }

    fn animal_exists(&self, ranch: RanchId, id: AnimalId) -> StoreResult<bool> {
        self.with_ranch(ranch, |t| Ok(t.animals.contains_key(&id.0)))
    }

    fn custom_field_definition_exists(&self, ranch: RanchId, id: RecordId) -> StoreResult<bool> {
        self.with_ranch(ranch, |t| Ok(t.definitions.contains_key(&id.0)))
    }

    fn allocate_animal_id(&self, ranch: RanchId) -> StoreResult<AnimalId> {
        self.with_ranch_mut(ranch, |t| {
            let floor = t.animals.keys().next_back().map_or(1, |max| max + 1);
            let id = t.next_animal_id.max(floor);
            t.next_animal_id = id + 1;
            Ok(AnimalId(id))
        })
    }

    fn insert_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()> {
        self.with_ranch_mut(ranch, |t| {
            if t.animals.contains_key(&animal.id.0) {
                return Err(StoreError::rejected(format!(
                    "animal {} already exists",
                    animal.id
                )));
            }
            t.animals.insert(animal.id.0, animal.clone());
            Ok(())
        })
    }

    fn update_animal(&self, ranch: RanchId, animal: &AnimalRecord) -> StoreResult<()> {
        self.with_ranch_mut(ranch, |t| match t.animals.get_mut(&animal.id.0) {
            Some(row) => {
                *row = animal.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(format!("animal {}", animal.id))),
        })
    }

    fn set_animal_parents(
        &self,
        ranch: RanchId,
        id: AnimalId,
        mother: Option<AnimalId>,
        father: Option<AnimalId>,
    ) -> StoreResult<()> {
        self.with_ranch_mut(ranch, |t| {
            let row = t
                .animals
                .get_mut(&id.0)
                .ok_or_else(|| StoreError::not_found(format!("animal {}", id)))?;
            row.mother_id = mother;
            row.father_id = father;
            Ok(())
        })
    }

    fn insert_custom_field_definition(
        &self,
        ranch: RanchId,
        definition: &CustomFieldDefinition,
    ) -> StoreResult<()> {
        self.with_ranch_mut(ranch, |t| {
            if t.definitions.contains_key(&definition.id.0) {
                return Err(StoreError::rejected(format!(
                    "custom field definition {} already exists",
                    definition.id
                )));
            }
            t.definitions.insert(definition.id.0, definition.clone());
            Ok(())
        })
    }

    fn insert_medical_record(
        &self,
        ranch: RanchId,
        record: &MedicalHistoryRecord,
    ) -> StoreResult<RecordId> {
        self.with_ranch_mut(ranch, |t| {
            t.require_animal(record.animal_id)?;
            let id = t.take_record_id();
            t.medical.insert(
                id.0,
                MedicalHistoryRecord {
                    id,
                    ..record.clone()
                },
            );
            Ok(id)
        })
    }

    fn insert_custom_field_value(
        &self,
        ranch: RanchId,
        value: &CustomFieldValue,
    ) -> StoreResult<RecordId> {
        self.with_ranch_mut(ranch, |t| {
            t.require_animal(value.animal_id)?;
            if !t.definitions.contains_key(&value.field_id.0) {
                return Err(StoreError::rejected(format!(
                    "foreign key violation: custom field {} does not exist",
                    value.field_id
                )));
            }
            let id = t.take_record_id();
            t.values.insert(
                id.0,
                CustomFieldValue {
                    id,
                    ..value.clone()
                },
            );
            Ok(id)
        })
    }

    fn insert_photo(&self, ranch: RanchId, photo: &PhotoRecord) -> StoreResult<RecordId> {
        self.with_ranch_mut(ranch, |t| {
            t.require_animal(photo.animal_id)?;
            let id = t.take_record_id();
            t.photos.insert(
                id.0,
                PhotoRecord {
                    id,
                    ..photo.clone()
                },
            );
            Ok(id)
        })
    }

    fn delete_all_animals(&self, ranch: RanchId) -> StoreResult<u64> {
        self.with_ranch_mut(ranch, |t| {
            let count = t.animals.len() as u64;
            t.animals.clear();
            t.medical.clear();
            t.values.clear();
            t.photos.clear();
            Ok(count)
        })
    }
}
