//! Restore Orchestrator: reconcile an archive into a live ranch
//!
//! Phases, in order:
//!
//! 1. lock the target ranch
//! 2. verify the whole archive ([`ArchiveReader::open`])
//! 3. consistency scan: identifiers, duplicates, parent table, definitions
//! 4. identity assignment, reading the live ranch only
//! 5. replace mode: delete the ranch's animals
//! 6. apply scan: settings, definitions, animals with parent links unset,
//!    subordinates, photos and media
//! 7. reference rewrite: set parent links to resolved targets
//!
//! Everything up to step 5 is read-only, so a corrupt archive or an
//! inconsistent one never touches the ranch.

use crate::cancel::CancellationToken;
use crate::config::{RetryConfig, VaultConfig};
use crate::error::{VaultError, VaultResult};
use crate::lock::RanchLocks;
use crate::media::{upload_with_retry, SpoolError, SpooledMedia};
use crate::progress::{Phase, ProgressReporter, ProgressSink};
use crate::reconcile::{ArchiveIndex, Attachment, ReconciliationMap, Resolution};
use crate::retry::with_retry;
use ranchvault_archive::{
    ArchiveFormatError, ArchiveHandle, ArchiveItem, ArchiveReader, ArchiveVerifyInfo,
    BatchRecords, EntityBatch, MediaEntry, ScanControl,
};
use ranchvault_core::{
    AnimalRecord, BlobPath, BlobStore, CustomFieldValue, EntityKind, MediaTransferError,
    MedicalHistoryRecord, PhotoRecord, RanchId, RanchSettings, RecordId, RecordStore,
    StoreResult,
};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a restore treats the animals already in the ranch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Keep live animals; add what the archive has that the ranch lacks
    #[default]
    Missing,
    /// Delete every live animal first, then restore into the empty ranch
    Replace,
}

impl RestoreMode {
    /// Name accepted by the triggering surface
    pub fn as_str(self) -> &'static str {
        match self {
            RestoreMode::Missing => "missing",
            RestoreMode::Replace => "replace",
        }
    }
}

impl FromStr for RestoreMode {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing" => Ok(RestoreMode::Missing),
            "replace" => Ok(RestoreMode::Replace),
            other => Err(VaultError::config(format!(
                "Invalid restore mode '{}'. Expected \"missing\" or \"replace\".",
                other
            ))),
        }
    }
}

impl fmt::Display for RestoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target and mode of a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreOptions {
    /// How live animals are treated
    pub mode: RestoreMode,
    /// Ranch to restore into
    pub ranch_id: RanchId,
}

impl RestoreOptions {
    /// Missing-mode restore into `ranch_id`
    pub fn missing(ranch_id: RanchId) -> Self {
        Self {
            mode: RestoreMode::Missing,
            ranch_id,
        }
    }

    /// Replace-mode restore into `ranch_id`
    pub fn replace(ranch_id: RanchId) -> Self {
        Self {
            mode: RestoreMode::Replace,
            ranch_id,
        }
    }
}

/// Outcome of a restore
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreSummary {
    /// Ranch restored into
    pub ranch_id: RanchId,
    /// Mode used
    pub mode: RestoreMode,
    /// Live animals deleted before restoring (replace mode)
    pub animals_deleted: u64,
    /// Animals inserted
    pub animals_restored: u64,
    /// Archived animals skipped as duplicates of live ones
    pub animals_skipped: u64,
    /// Live animals updated in place (overwrite policy)
    pub animals_updated: u64,
    /// Whether the archived settings were written
    pub settings_restored: bool,
    /// Custom-field definitions inserted
    pub definitions_restored: u64,
    /// Archived definitions matched to a live one with the same id
    pub definitions_reused: u64,
    /// Medical history rows inserted
    pub medical_restored: u64,
    /// Custom-field values inserted
    pub custom_values_restored: u64,
    /// Photo rows inserted, flagged or not
    pub photos_restored: u64,
    /// Media objects uploaded
    pub media_restored: u64,
    /// Media objects that could not be restored
    pub media_failed: u64,
    /// Subordinate records dropped for an unresolvable reference
    pub records_dropped: u64,
    /// Parent links set to null
    pub parent_links_nulled: u64,
    /// One entry per failed media object
    pub media_failures: Vec<MediaTransferError>,
    /// Final progress message
    pub last_progress: Option<String>,
}

/// Restores archives into ranches of the injected stores
pub struct RestoreOrchestrator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: VaultConfig,
    locks: RanchLocks,
}

impl RestoreOrchestrator {
    /// Orchestrator over the given stores
    ///
    /// Ranch locks are shared by every orchestrator in the process; with
    /// `config.lock_dir` set they also exclude other processes.
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: VaultConfig,
    ) -> Self {
        let locks = match &config.lock_dir {
            Some(dir) => RanchLocks::with_lock_dir(dir.clone()),
            None => RanchLocks::new(),
        };
        Self {
            records,
            blobs,
            config,
            locks,
        }
    }

    /// Share a lock registry with other orchestrators
    pub fn with_locks(mut self, locks: RanchLocks) -> Self {
        self.locks = locks;
        self
    }

    /// The lock registry in use
    pub fn locks(&self) -> &RanchLocks {
        &self.locks
    }

    /// Run only the validation pass over an archive
    pub fn verify_archive(path: impl AsRef<Path>) -> VaultResult<ArchiveVerifyInfo> {
        Ok(ArchiveReader::validate(path)?)
    }

    /// Restore `archive` into `options.ranch_id`
    ///
    /// Fails with `RestoreLockError` if another restore holds the ranch, and
    /// with `ArchiveFormatError` or `ReconciliationError` before any live
    /// mutation. Media failures are counted in the summary, never raised.
    pub fn restore(
        &self,
        archive: &ArchiveHandle,
        options: RestoreOptions,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> VaultResult<RestoreSummary> {
        self.config.validate()?;
        let policy = self.config.collision_policy()?;
        let ranch = options.ranch_id;
        let mut progress = ProgressReporter::new(
            progress,
            self.config.progress_every_records,
            self.config.progress_interval(),
        );
        let retry = &self.config.retry;

        progress.phase(Phase::Lock, format!("Locking ranch {}", ranch));
        let _guard = self.locks.try_acquire(ranch)?;
        if !store_call(retry, "ranch lookup", || self.records.ranch_exists(ranch))? {
            return Err(VaultError::TargetRanchNotFound(ranch));
        }
        info!(
            target: "ranchvault::restore",
            ranch_id = %ranch,
            mode = %options.mode,
            policy = %policy,
            archive = %archive.path.display(),
            "Restore started"
        );

        progress.phase(Phase::Validate, "Validating archive");
        let reader = ArchiveReader::open(&archive.path)?;
        cancel.check()?;

        progress.phase(Phase::Consistency, "Checking archive consistency");
        let mut index = ArchiveIndex::new();
        reader.scan(|item| -> VaultResult<ScanControl> {
            cancel.check()?;
            match item {
                ArchiveItem::Batch(batch) => {
                    index.observe(&batch)?;
                    Ok(ScanControl::Continue)
                }
                // Media follows every section
                ArchiveItem::Media(_) => Ok(ScanControl::Stop),
            }
        })?;
        debug!(
            target: "ranchvault::restore",
            ranch_id = %ranch,
            animals = index.animals().len(),
            "Consistency pass complete"
        );

        progress.phase(Phase::IdentityAssignment, "Assigning animal identities");
        let mut summary = RestoreSummary {
            ranch_id: ranch,
            mode: options.mode,
            ..RestoreSummary::default()
        };
        let map = match options.mode {
            RestoreMode::Missing => ReconciliationMap::against_live(index, ranch, policy, |id| {
                store_call(retry, "animal lookup", || self.records.animal_exists(ranch, id))
            })?,
            RestoreMode::Replace => {
                cancel.check()?;
                progress.phase(Phase::Delete, format!("Deleting animals of ranch {}", ranch));
                summary.animals_deleted = store_call(retry, "delete animals", || {
                    self.records.delete_all_animals(ranch)
                })?;
                info!(
                    target: "ranchvault::restore",
                    ranch_id = %ranch,
                    deleted = summary.animals_deleted,
                    "Deleted live animals"
                );
                ReconciliationMap::fresh(index, || {
                    store_call(retry, "allocate animal id", || {
                        self.records.allocate_animal_id(ranch)
                    })
                })?
            }
        };

        progress.phase(Phase::Apply, "Restoring records");
        let missing_reasons: FxHashMap<String, String> = reader
            .manifest()
            .missing_media
            .iter()
            .map(|m| (m.path.clone(), m.reason.clone()))
            .collect();
        let mut apply = Applier {
            records: self.records.as_ref(),
            blobs: self.blobs.as_ref(),
            config: &self.config,
            ranch,
            mode: options.mode,
            map,
            summary,
            pending: BTreeMap::new(),
            live_fields: FxHashMap::default(),
            progress: &mut progress,
        };
        reader.scan(|item| -> VaultResult<ScanControl> {
            cancel.check()?;
            match item {
                ArchiveItem::Batch(batch) => apply.batch(batch)?,
                ArchiveItem::Media(entry) => apply.media(entry)?,
            }
            Ok(ScanControl::Continue)
        })?;
        apply.unmatched_photos(&missing_reasons)?;
        let Applier {
            mut map,
            mut summary,
            ..
        } = apply;

        cancel.check()?;
        progress.phase(Phase::ReferenceRewrite, "Rewriting parent links");
        for (target, mother, father) in map.rewritten_parents() {
            store_call(retry, "set parents", || {
                self.records.set_animal_parents(ranch, target, mother, father)
            })?;
        }

        summary.records_dropped = map.stats().records_dropped();
        summary.parent_links_nulled = map.stats().parent_links_nulled;
        progress.phase(
            Phase::Done,
            format!(
                "Restored {} animals ({} skipped), {} media ({} failed)",
                summary.animals_restored,
                summary.animals_skipped,
                summary.media_restored,
                summary.media_failed
            ),
        );
        summary.last_progress = progress.last_message().map(str::to_string);

        info!(
            target: "ranchvault::restore",
            ranch_id = %ranch,
            restored = summary.animals_restored,
            skipped = summary.animals_skipped,
            updated = summary.animals_updated,
            media_restored = summary.media_restored,
            media_failed = summary.media_failed,
            dropped = summary.records_dropped,
            links_nulled = summary.parent_links_nulled,
            "Restore finished"
        );
        Ok(summary)
    }
}

/// Store call with bounded retries, mapped to `VaultError::Store`
fn store_call<T>(
    retry: &RetryConfig,
    context: &str,
    op: impl FnMut() -> StoreResult<T>,
) -> VaultResult<T> {
    with_retry(retry, context, op).map_err(|e| VaultError::store(context, e.source))
}

/// State of the apply scan
struct Applier<'a, 'p> {
    records: &'a dyn RecordStore,
    blobs: &'a dyn BlobStore,
    config: &'a VaultConfig,
    ranch: RanchId,
    mode: RestoreMode,
    map: ReconciliationMap,
    summary: RestoreSummary,
    /// Photo rows waiting for their media, keyed by archived blob path
    pending: BTreeMap<String, Vec<PhotoRecord>>,
    /// Field ids outside the archive, checked against the live ranch once
    live_fields: FxHashMap<RecordId, bool>,
    progress: &'a mut ProgressReporter<'p>,
}

impl Applier<'_, '_> {
    fn store<T>(&self, context: &str, op: impl FnMut() -> StoreResult<T>) -> VaultResult<T> {
        store_call(&self.config.retry, context, op)
    }

    fn batch(&mut self, batch: EntityBatch) -> VaultResult<()> {
        let kind = batch.kind();
        let n = batch.records.len() as u64;
        match batch.records {
            BatchRecords::Settings(rows) => {
                if let Some(settings) = rows.into_iter().next() {
                    self.settings(settings)?;
                }
            }
            BatchRecords::CustomFieldDefinitions(rows) => {
                for def in rows {
                    let live = self.store("definition lookup", || {
                        self.records.custom_field_definition_exists(self.ranch, def.id)
                    })?;
                    if live {
                        self.summary.definitions_reused += 1;
                    } else {
                        self.store("insert definition", || {
                            self.records.insert_custom_field_definition(self.ranch, &def)
                        })?;
                        self.summary.definitions_restored += 1;
                    }
                }
            }
            BatchRecords::Animals(rows) => {
                for animal in rows {
                    self.animal(animal)?;
                }
            }
            BatchRecords::MedicalHistory(rows) => {
                for row in rows {
                    if let Attachment::To(animal_id) = self.map.attach(kind, row.animal_id) {
                        let row = MedicalHistoryRecord { animal_id, ..row };
                        self.store("insert medical record", || {
                            self.records.insert_medical_record(self.ranch, &row)
                        })?;
                        self.summary.medical_restored += 1;
                    }
                }
            }
            BatchRecords::CustomFieldValues(rows) => {
                for row in rows {
                    if let Attachment::To(animal_id) = self.map.attach(kind, row.animal_id) {
                        if !self.field_resolves(row.field_id)? {
                            self.map.count_orphan(kind);
                            continue;
                        }
                        let row = CustomFieldValue { animal_id, ..row };
                        self.store("insert custom field value", || {
                            self.records.insert_custom_field_value(self.ranch, &row)
                        })?;
                        self.summary.custom_values_restored += 1;
                    }
                }
            }
            BatchRecords::Photos(rows) => {
                for row in rows {
                    if let Attachment::To(animal_id) = self.map.attach(kind, row.animal_id) {
                        let key = row.storage_path.to_string();
                        let storage_path = row.storage_path.relocate(self.ranch, animal_id);
                        self.pending.entry(key).or_default().push(PhotoRecord {
                            animal_id,
                            storage_path,
                            ..row
                        });
                    }
                }
            }
        }

        let restored = self.summary.animals_restored;
        let skipped = self.summary.animals_skipped;
        self.progress.advance(Phase::Apply, n, || {
            format!("Restored {} animals ({} skipped)", restored, skipped)
        });
        Ok(())
    }

    fn settings(&mut self, settings: RanchSettings) -> VaultResult<()> {
        let write = match self.mode {
            RestoreMode::Replace => true,
            RestoreMode::Missing => self
                .store("settings", || self.records.settings(self.ranch))?
                .is_none(),
        };
        if write {
            self.store("put settings", || {
                self.records.put_settings(self.ranch, &settings)
            })?;
            self.summary.settings_restored = true;
        }
        Ok(())
    }

    fn animal(&mut self, animal: AnimalRecord) -> VaultResult<()> {
        match self.map.resolve(animal.id) {
            Some(Resolution::Insert(id)) => {
                let row = AnimalRecord {
                    id,
                    mother_id: None,
                    father_id: None,
                    ..animal
                };
                self.store("insert animal", || self.records.insert_animal(self.ranch, &row))?;
                self.summary.animals_restored += 1;
            }
            Some(Resolution::Overwrite(id)) => {
                let row = AnimalRecord {
                    id,
                    mother_id: None,
                    father_id: None,
                    ..animal
                };
                self.store("update animal", || self.records.update_animal(self.ranch, &row))?;
                self.summary.animals_updated += 1;
            }
            Some(Resolution::Skip) | None => self.summary.animals_skipped += 1,
        }
        Ok(())
    }

    fn field_resolves(&mut self, field_id: RecordId) -> VaultResult<bool> {
        if self.map.archived_definition(field_id) {
            return Ok(true);
        }
        if let Some(&known) = self.live_fields.get(&field_id) {
            return Ok(known);
        }
        let live = self.store("definition lookup", || {
            self.records.custom_field_definition_exists(self.ranch, field_id)
        })?;
        self.live_fields.insert(field_id, live);
        Ok(live)
    }

    fn media(&mut self, mut entry: MediaEntry<'_>) -> VaultResult<()> {
        let key = entry.path.to_string();
        // Photo skipped with its animal, or dropped as an orphan
        let Some(photos) = self.pending.remove(&key) else {
            return Ok(());
        };
        let expected = entry.expected_checksum.to_string();

        let mut spooled = match SpooledMedia::spool(&mut entry, self.config.max_media_bytes) {
            Ok(spooled) if spooled.checksum != expected => Err(format!(
                "checksum mismatch: expected {}, got {}",
                expected, spooled.checksum
            )),
            Ok(spooled) => Ok(spooled),
            Err(SpoolError::TooLarge { limit }) => {
                Err(format!("too large: exceeds {} bytes", limit))
            }
            Err(SpoolError::Io(e)) => {
                return Err(ArchiveFormatError::from_stream("read media", e).into())
            }
        };

        // Rows of different animals may share one archived path
        for (target, photos) in by_target(photos) {
            let uploaded = match spooled.as_mut() {
                Ok(spooled) => upload_with_retry(
                    self.blobs,
                    &target,
                    spooled,
                    self.config.media_upload_attempts,
                    &self.config.retry,
                ),
                // Rejected on its one read from the archive
                Err(reason) => Err(MediaTransferError::new(&target, 1, reason.as_str())),
            };
            let missing = match uploaded {
                Ok(bytes) => {
                    debug!(target: "ranchvault::media", path = %target, bytes, "Media restored");
                    self.summary.media_restored += 1;
                    false
                }
                Err(failure) => {
                    self.media_failed(failure);
                    true
                }
            };
            self.insert_photos(photos, missing)?;
        }

        let restored = self.summary.media_restored;
        let failed = self.summary.media_failed;
        self.progress.advance(Phase::Apply, 1, || {
            format!("Restored {} media files ({} failed)", restored, failed)
        });
        Ok(())
    }

    /// Photos whose media never arrived are created flagged
    fn unmatched_photos(&mut self, missing_reasons: &FxHashMap<String, String>) -> VaultResult<()> {
        for (key, photos) in std::mem::take(&mut self.pending) {
            let reason = missing_reasons
                .get(&key)
                .map(|r| format!("missing at export: {}", r))
                .unwrap_or_else(|| "not present in archive".to_string());
            for (target, photos) in by_target(photos) {
                self.media_failed(MediaTransferError::new(&target, 1, &reason));
                self.insert_photos(photos, true)?;
            }
        }
        Ok(())
    }

    fn media_failed(&mut self, failure: MediaTransferError) {
        warn!(
            target: "ranchvault::media",
            ranch_id = %self.ranch,
            path = %failure.path,
            attempts = failure.attempts,
            reason = %failure.reason,
            "Media not restored; photo will be flagged"
        );
        self.summary.media_failed += 1;
        self.summary.media_failures.push(failure);
    }

    fn insert_photos(&mut self, photos: Vec<PhotoRecord>, media_missing: bool) -> VaultResult<()> {
        for photo in photos {
            let row = PhotoRecord {
                media_missing,
                ..photo
            };
            self.store("insert photo", || self.records.insert_photo(self.ranch, &row))?;
            self.summary.photos_restored += 1;
        }
        Ok(())
    }
}

/// Group photo rows by the live path their media goes to
fn by_target(photos: Vec<PhotoRecord>) -> BTreeMap<BlobPath, Vec<PhotoRecord>> {
    let mut targets: BTreeMap<BlobPath, Vec<PhotoRecord>> = BTreeMap::new();
    for photo in photos {
        targets
            .entry(photo.storage_path.clone())
            .or_default()
            .push(photo);
    }
    targets
}
