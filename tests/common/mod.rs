//! Shared fixtures for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub use ranchvault::{
    AnimalId, AnimalRecord, ArchiveHandle, BlobPath, BlobStore, CancellationToken,
    CollisionPolicy, CustomFieldDefinition, CustomFieldValue, FieldType, MedicalHistoryRecord,
    MemoryBlobStore, MemoryRecordStore, NoProgress, PhotoRecord, RanchId, RanchLocks,
    RanchSettings, RecordId, RecordStore, RestoreMode, RestoreOptions, RestoreOrchestrator, RestoreSummary,
    RetryConfig, SnapshotBuilder, VaultConfig, VaultError, VaultResult,
};

pub use ranchvault_archive::BatchRecords;

pub const SOURCE: RanchId = RanchId(1);
pub const TARGET: RanchId = RanchId(2);

/// Config with no retry delays
pub fn fast_config() -> VaultConfig {
    VaultConfig::default()
        .with_page_size(3)
        .with_retry(RetryConfig::immediate())
}

// ============================================================================
// Record builders
// ============================================================================

pub fn animal(id: u64, tag: &str) -> AnimalRecord {
    AnimalRecord::new(AnimalId(id), tag)
}

pub fn medical(animal: u64, description: &str) -> MedicalHistoryRecord {
    MedicalHistoryRecord {
        id: RecordId(0),
        animal_id: AnimalId(animal),
        recorded_on: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
        kind: "vaccination".to_string(),
        description: description.to_string(),
        administered_by: Some("Doc Ames".to_string()),
    }
}

pub fn definition(id: u64, name: &str) -> CustomFieldDefinition {
    CustomFieldDefinition {
        id: RecordId(id),
        name: name.to_string(),
        field_type: FieldType::Text,
        required: false,
    }
}

pub fn value(animal: u64, field: u64, value: &str) -> CustomFieldValue {
    CustomFieldValue {
        id: RecordId(0),
        animal_id: AnimalId(animal),
        field_id: RecordId(field),
        value: value.to_string(),
    }
}

pub fn blob_path(ranch: RanchId, animal: u64, name: &str) -> BlobPath {
    BlobPath::new(ranch, AnimalId(animal), name).unwrap()
}

pub fn photo(ranch: RanchId, animal: u64, name: &str, size: u64) -> PhotoRecord {
    PhotoRecord {
        id: RecordId(0),
        animal_id: AnimalId(animal),
        storage_path: blob_path(ranch, animal, name),
        media_type: "image/jpeg".to_string(),
        byte_size: size,
        is_primary: false,
        media_missing: false,
    }
}

pub fn photo_bytes(name: &str, size: usize) -> Vec<u8> {
    name.bytes().cycle().take(size).collect()
}

// ============================================================================
// Environment
// ============================================================================

/// Stores plus a scratch directory for archives
///
/// Each `Env` has its own lock registry so tests running in parallel on the
/// same ranch ids do not contend.
pub struct Env {
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub locks: RanchLocks,
    pub dir: TempDir,
}

impl Env {
    /// Both ranches exist and are empty
    pub fn new() -> Self {
        let records = MemoryRecordStore::new();
        records.create_ranch(SOURCE);
        records.create_ranch(TARGET);
        Self {
            records: Arc::new(records),
            blobs: Arc::new(MemoryBlobStore::new()),
            locks: RanchLocks::isolated(),
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{}.ranchvault.tar.zst", name))
    }

    pub fn export(&self, ranch: RanchId) -> ArchiveHandle {
        SnapshotBuilder::new(self.records.clone(), self.blobs.clone(), fast_config())
            .export(
                ranch,
                &self.archive_path(&format!("ranch-{}", ranch)),
                &mut NoProgress,
                &CancellationToken::new(),
            )
            .unwrap()
            .handle
    }

    pub fn orchestrator(&self, config: VaultConfig) -> RestoreOrchestrator {
        self.orchestrator_over(self.records.clone(), self.blobs.clone(), config)
    }

    /// Orchestrator over other stores, sharing this env's lock registry
    pub fn orchestrator_over(
        &self,
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: VaultConfig,
    ) -> RestoreOrchestrator {
        let locks = match &config.lock_dir {
            Some(dir) => self.locks.clone().lock_files_in(dir),
            None => self.locks.clone(),
        };
        RestoreOrchestrator::new(records, blobs, config).with_locks(locks)
    }

    pub fn restore(
        &self,
        handle: &ArchiveHandle,
        options: RestoreOptions,
    ) -> VaultResult<RestoreSummary> {
        self.orchestrator(fast_config())
            .restore(handle, options, &mut NoProgress, &CancellationToken::new())
    }

    pub fn insert_animals(&self, ranch: RanchId, rows: &[AnimalRecord]) {
        for row in rows {
            self.records.insert_animal(ranch, row).unwrap();
        }
    }

    /// Photo row plus its bytes in the Blob Store
    pub fn insert_photo(&self, ranch: RanchId, animal: u64, name: &str, size: usize) -> BlobPath {
        let row = photo(ranch, animal, name, size as u64);
        self.records.insert_photo(ranch, &row).unwrap();
        self.blobs
            .insert(row.storage_path.clone(), photo_bytes(name, size));
        row.storage_path
    }

    /// A small herd with every entity type
    ///
    /// Cow(1) and Bull(2) are founders; Calf(3) and Heifer(4) are their
    /// offspring; Yearling(5) is out of Heifer by an unrecorded sire (77).
    pub fn seed_herd(&self, ranch: RanchId) {
        self.records
            .put_settings(
                ranch,
                &RanchSettings {
                    ranch_name: "Bar K".to_string(),
                    timezone: "America/Denver".to_string(),
                    weight_unit: "lb".to_string(),
                    extra: BTreeMap::new(),
                },
            )
            .unwrap();
        for def in [definition(10, "Brand"), definition(11, "Pasture")] {
            self.records
                .insert_custom_field_definition(ranch, &def)
                .unwrap();
        }
        self.insert_animals(
            ranch,
            &[
                animal(1, "COW-1"),
                animal(2, "BULL-2"),
                animal(3, "CALF-3").with_parents(Some(AnimalId(1)), Some(AnimalId(2))),
                animal(4, "HEIFER-4").with_parents(Some(AnimalId(1)), Some(AnimalId(2))),
                animal(5, "YRL-5").with_parents(Some(AnimalId(4)), Some(AnimalId(77))),
            ],
        );
        for (id, text) in [(1, "blackleg"), (3, "brucellosis"), (3, "tagging"), (5, "BVD")] {
            self.records
                .insert_medical_record(ranch, &medical(id, text))
                .unwrap();
        }
        for (id, field, text) in [(1, 10, "K-bar"), (3, 10, "K-bar"), (3, 11, "north")] {
            self.records
                .insert_custom_field_value(ranch, &value(id, field, text))
                .unwrap();
        }
        self.insert_photo(ranch, 1, "cow.jpg", 4_000);
        self.insert_photo(ranch, 3, "calf.jpg", 70_000);
        self.insert_photo(ranch, 5, "yearling.png", 10);
    }
}

// ============================================================================
// Views over a ranch
// ============================================================================

/// Animal tag -> (mother tag, father tag)
pub fn parent_topology(
    records: &MemoryRecordStore,
    ranch: RanchId,
) -> BTreeMap<String, (Option<String>, Option<String>)> {
    let animals = records.all_animals(ranch);
    let tag_of = |id: Option<AnimalId>| {
        id.and_then(|id| animals.iter().find(|a| a.id == id).map(|a| a.tag.clone()))
    };
    animals
        .iter()
        .map(|a| (a.tag.clone(), (tag_of(a.mother_id), tag_of(a.father_id))))
        .collect()
}

/// (animal tag, field name, value) for every custom-field value
pub fn custom_values(records: &MemoryRecordStore, ranch: RanchId) -> BTreeSet<(String, String, String)> {
    let animals = records.all_animals(ranch);
    let defs = records.all_custom_field_definitions(ranch);
    records
        .all_custom_field_values(ranch)
        .into_iter()
        .map(|v| {
            let tag = animals
                .iter()
                .find(|a| a.id == v.animal_id)
                .map(|a| a.tag.clone())
                .unwrap_or_default();
            let field = defs
                .iter()
                .find(|d| d.id == v.field_id)
                .map(|d| d.name.clone())
                .unwrap_or_default();
            (tag, field, v.value)
        })
        .collect()
}

/// (animal tag, description) for every medical record
pub fn medical_by_tag(records: &MemoryRecordStore, ranch: RanchId) -> Vec<(String, String)> {
    let animals = records.all_animals(ranch);
    let mut rows: Vec<_> = records
        .all_medical_history(ranch)
        .into_iter()
        .map(|m| {
            let tag = animals
                .iter()
                .find(|a| a.id == m.animal_id)
                .map(|a| a.tag.clone())
                .unwrap_or_default();
            (tag, m.description)
        })
        .collect();
    rows.sort();
    rows
}

/// Every non-null parent link points at an animal in the ranch
pub fn assert_parent_links_resolve(records: &MemoryRecordStore, ranch: RanchId) {
    let animals = records.all_animals(ranch);
    for a in &animals {
        for parent in a.parent_ids() {
            assert!(
                animals.iter().any(|p| p.id == parent),
                "animal {} ({}) links to missing parent {}",
                a.id,
                a.tag,
                parent
            );
        }
    }
}

/// Hand-built archive from SOURCE holding only `batches`
pub fn write_archive(path: &Path, batches: &[BatchRecords]) {
    let (bytes, _) = ranchvault_archive::write_to_vec(SOURCE, batches, &[]).unwrap();
    std::fs::write(path, bytes).unwrap();
}

/// Flip one byte in the middle of a file
pub fn corrupt(path: &Path) {
    let mut bytes = std::fs::read(path).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0xFF;
    std::fs::write(path, bytes).unwrap();
}
