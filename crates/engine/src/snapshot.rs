//! Snapshot Builder: export a ranch to a `.ranchvault.tar.zst` archive
//!
//! Pages through each entity type in archive order, one store page per
//! archive batch, then streams media through the [`MediaCollector`]. The
//! archive is written to a temp sibling and renamed on success; any error or
//! cancellation leaves nothing behind.

use crate::cancel::CancellationToken;
use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::media::MediaCollector;
use crate::progress::{Phase, ProgressReporter, ProgressSink};
use crate::retry::with_retry;
use chrono::{DateTime, Utc};
use ranchvault_archive::{
    ArchiveFileWriter, ArchiveHandle, ArchiveWriter, BatchRecords, ExportOptions, MissingMedia,
    ARCHIVE_EXTENSION,
};
use ranchvault_core::{
    BlobStore, EntityKind, ExportError, Page, PageRequest, RanchId, RecordStore, StoreError,
};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Information returned after exporting a ranch
#[derive(Debug, Clone)]
pub struct ExportReport {
    /// The finished archive
    pub handle: ArchiveHandle,
    /// Ranch that was exported
    pub ranch_id: RanchId,
    /// Section name -> records written
    pub entity_counts: BTreeMap<String, u64>,
    /// Media objects stored
    pub media_exported: u64,
    /// Media bytes stored
    pub media_bytes: u64,
    /// Photos exported without bytes
    pub missing_media: Vec<MissingMedia>,
    /// Weak references that did not resolve inside the snapshot
    pub dangling_references: u64,
    /// Size of the archive file in bytes
    pub bundle_size_bytes: u64,
    /// xxh3 checksum of the archive file
    pub checksum: String,
}

/// Ids seen so far, for the dangling-reference check
#[derive(Default)]
struct ReferenceCheck {
    definitions: HashSet<u64>,
    animals: HashSet<u64>,
    parent_links: Vec<(u64, u64)>,
    dangling: u64,
}

impl ReferenceCheck {
    fn observe(&mut self, records: &BatchRecords) {
        match records {
            BatchRecords::CustomFieldDefinitions(defs) => {
                self.definitions.extend(defs.iter().map(|d| d.id.get()));
            }
            BatchRecords::Animals(animals) => {
                for animal in animals {
                    self.animals.insert(animal.id.get());
                    for parent in animal.parent_ids() {
                        self.parent_links.push((animal.id.get(), parent.get()));
                    }
                }
            }
            BatchRecords::MedicalHistory(rows) => {
                self.expect_animals(EntityKind::MedicalHistory, rows.iter().map(|r| r.animal_id.get()));
            }
            BatchRecords::CustomFieldValues(rows) => {
                self.expect_animals(
                    EntityKind::CustomFieldValues,
                    rows.iter().map(|r| r.animal_id.get()),
                );
                for row in rows {
                    if !self.definitions.contains(&row.field_id.get()) {
                        self.dangling += 1;
                    }
                }
            }
            BatchRecords::Photos(rows) => {
                self.expect_animals(EntityKind::Photos, rows.iter().map(|r| r.animal_id.get()));
            }
            BatchRecords::Settings(_) => {}
        }
    }

    fn expect_animals(&mut self, kind: EntityKind, ids: impl Iterator<Item = u64>) {
        for id in ids {
            if !self.animals.contains(&id) {
                self.dangling += 1;
                warn!(
                    target: "ranchvault::export",
                    section = %kind,
                    animal_id = id,
                    "Record references an animal outside the snapshot"
                );
            }
        }
    }

    /// Parents can appear on a later page than their offspring
    fn finish_animals(&mut self) {
        for (child, parent) in std::mem::take(&mut self.parent_links) {
            if !self.animals.contains(&parent) {
                self.dangling += 1;
                warn!(
                    target: "ranchvault::export",
                    animal_id = child,
                    parent_id = parent,
                    "Parent link points outside the snapshot"
                );
            }
        }
    }
}

/// Exports ranches from the injected stores
pub struct SnapshotBuilder {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    config: VaultConfig,
}

impl SnapshotBuilder {
    /// Builder over the given stores
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        config: VaultConfig,
    ) -> Self {
        Self {
            records,
            blobs,
            config,
        }
    }

    /// Conventional archive file name for a ranch export
    pub fn default_file_name(ranch: RanchId, at: DateTime<Utc>) -> String {
        format!(
            "ranch-{}-{}{}",
            ranch,
            at.format("%Y%m%dT%H%M%SZ"),
            ARCHIVE_EXTENSION
        )
    }

    /// Export `ranch` to an archive at `dest`
    ///
    /// Fails with `ExportError::RanchNotFound` for an unknown ranch,
    /// `ExportError::StoreUnavailable` when a read keeps failing after the
    /// configured retries and `ExportError::ArchiveWrite` when the archive
    /// file cannot be written. Media that cannot be fetched is recorded as
    /// missing in the manifest and in the report.
    pub fn export(
        &self,
        ranch: RanchId,
        dest: &Path,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> VaultResult<ExportReport> {
        // Export only writes archives, so every format error is a write failure
        self.write_snapshot(ranch, dest, progress, cancel)
            .map_err(|e| match e {
                VaultError::ArchiveFormat(source) => ExportError::ArchiveWrite {
                    path: dest.to_path_buf(),
                    source: Box::new(source),
                }
                .into(),
                other => other,
            })
    }

    fn write_snapshot(
        &self,
        ranch: RanchId,
        dest: &Path,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> VaultResult<ExportReport> {
        self.config.validate()?;
        let mut progress = ProgressReporter::new(
            progress,
            self.config.progress_every_records,
            self.config.progress_interval(),
        );

        if !self.read("ranch", || self.records.ranch_exists(ranch))? {
            return Err(ExportError::RanchNotFound(ranch).into());
        }
        info!(target: "ranchvault::export", ranch_id = %ranch, dest = %dest.display(), "Export started");
        progress.phase(Phase::ExportRecords, format!("Exporting ranch {}", ranch));

        let options = ExportOptions {
            compression_level: self.config.compression_level,
        };
        let mut writer = ArchiveFileWriter::create(dest, ranch, Utc::now(), &options)?;
        let mut refs = ReferenceCheck::default();

        // Sections, in archive order
        cancel.check()?;
        let settings = self.read("settings", || self.records.settings(ranch))?;
        let batch = BatchRecords::Settings(settings.into_iter().collect());
        refs.observe(&batch);
        writer.write_batch(&batch)?;

        self.export_section(
            ranch,
            EntityKind::CustomFieldDefinitions,
            |req| self.records.custom_field_definitions(ranch, req),
            BatchRecords::CustomFieldDefinitions,
            &mut writer,
            &mut refs,
            &mut progress,
            cancel,
        )?;
        self.export_section(
            ranch,
            EntityKind::Animals,
            |req| self.records.animals(ranch, req),
            BatchRecords::Animals,
            &mut writer,
            &mut refs,
            &mut progress,
            cancel,
        )?;
        refs.finish_animals();
        self.export_section(
            ranch,
            EntityKind::MedicalHistory,
            |req| self.records.medical_history(ranch, req),
            BatchRecords::MedicalHistory,
            &mut writer,
            &mut refs,
            &mut progress,
            cancel,
        )?;
        self.export_section(
            ranch,
            EntityKind::CustomFieldValues,
            |req| self.records.custom_field_values(ranch, req),
            BatchRecords::CustomFieldValues,
            &mut writer,
            &mut refs,
            &mut progress,
            cancel,
        )?;
        self.export_section(
            ranch,
            EntityKind::Photos,
            |req| self.records.photos(ranch, req),
            BatchRecords::Photos,
            &mut writer,
            &mut refs,
            &mut progress,
            cancel,
        )?;

        // Media
        progress.phase(Phase::ExportMedia, "Exporting media");
        let collector = MediaCollector::new(self.records.as_ref(), self.blobs.as_ref(), &self.config);
        let media = collector.collect(ranch, &mut writer, &mut progress, cancel)?;

        cancel.check()?;
        progress.phase(Phase::Finalize, "Writing manifest");
        let info = writer.finish()?;

        if refs.dangling > 0 {
            warn!(
                target: "ranchvault::export",
                ranch_id = %ranch,
                dangling = refs.dangling,
                "Snapshot holds references that do not resolve"
            );
        }
        info!(
            target: "ranchvault::export",
            ranch_id = %ranch,
            path = %info.handle.path.display(),
            records = info.manifest.total_records(),
            media = media.exported,
            missing_media = media.missing.len(),
            bytes = info.bundle_size_bytes,
            "Export finished"
        );
        progress.phase(
            Phase::Done,
            format!(
                "Exported {} records and {} media files ({} missing)",
                info.manifest.total_records(),
                media.exported,
                media.missing.len()
            ),
        );

        Ok(ExportReport {
            handle: info.handle,
            ranch_id: ranch,
            entity_counts: info.manifest.entity_counts,
            media_exported: media.exported,
            media_bytes: media.bytes,
            missing_media: media.missing,
            dangling_references: refs.dangling,
            bundle_size_bytes: info.bundle_size_bytes,
            checksum: info.checksum,
        })
    }

    /// Export into `dir` under [`SnapshotBuilder::default_file_name`]
    pub fn export_to_dir(
        &self,
        ranch: RanchId,
        dir: &Path,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> VaultResult<ExportReport> {
        let dest: PathBuf = dir.join(Self::default_file_name(ranch, Utc::now()));
        self.export(ranch, &dest, progress, cancel)
    }

    #[allow(clippy::too_many_arguments)]
    fn export_section<T, W: Write>(
        &self,
        ranch: RanchId,
        kind: EntityKind,
        read_page: impl Fn(PageRequest) -> Result<Page<T>, StoreError>,
        wrap: impl Fn(Vec<T>) -> BatchRecords,
        writer: &mut ArchiveWriter<W>,
        refs: &mut ReferenceCheck,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> VaultResult<u64> {
        let mut written = 0u64;
        let mut request = Some(PageRequest::first(self.config.page_size));
        while let Some(page_request) = request {
            cancel.check()?;
            let page = self.read(kind.as_str(), || read_page(page_request))?;
            request = page.next_request(self.config.page_size);

            let batch = wrap(page.items);
            let n = batch.len() as u64;
            refs.observe(&batch);
            writer.write_batch(&batch)?;
            written += n;
            progress.advance(Phase::ExportRecords, n, || {
                format!("Exported {} {} records", written, kind)
            });
        }
        tracing::debug!(
            target: "ranchvault::export",
            ranch_id = %ranch,
            section = %kind,
            records = written,
            "Section exported"
        );
        Ok(written)
    }

    /// Store read with bounded retries, mapped to `ExportError`
    fn read<T>(&self, what: &str, op: impl FnMut() -> Result<T, StoreError>) -> VaultResult<T> {
        with_retry(&self.config.retry, what, op).map_err(|e| {
            VaultError::from(ExportError::StoreUnavailable {
                what: what.to_string(),
                attempts: e.attempts,
                source: e.source,
            })
        })
    }
}
