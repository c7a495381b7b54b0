//! Ranch archive writer
//!
//! Creates .ranchvault.tar.zst archives incrementally:
//! - sections/<section>/<seq>.batch - one batch per store page, in section order
//! - media/<ranch>/<animal>/<filename> - raw media bytes
//! - MANIFEST.json - counts and checksums, always the final entry
//!
//! Entries are streamed into the compressor as they are produced, so the
//! writer never holds more than one batch in memory.

use crate::batch::{encode_batch, BatchRecords};
use crate::error::{ArchiveFormatError, ArchiveResult};
use crate::types::{
    paths, xxh3_file, xxh3_hex, ArchiveHandle, ArchiveInfo, ExportOptions, HashingReader,
    MediaChecksum, MissingMedia, RanchSnapshotManifest,
};
use chrono::{DateTime, Utc};
use ranchvault_core::{BlobPath, EntityKind, RanchId};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tar::{Builder, Header};
use tracing::debug;

/// Streaming writer over any `Write` sink
pub struct ArchiveWriter<W: Write> {
    builder: Builder<zstd::Encoder<'static, W>>,
    manifest: RanchSnapshotManifest,
    next_seq: [u32; EntityKind::ALL.len()],
    current_section: Option<EntityKind>,
    media_started: bool,
    media_paths: HashSet<String>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Start an archive for `ranch_id`
    pub fn new(
        inner: W,
        ranch_id: RanchId,
        exported_at: DateTime<Utc>,
        options: &ExportOptions,
    ) -> ArchiveResult<Self> {
        let mut encoder = zstd::Encoder::new(inner, options.compression_level)
            .map_err(|e| ArchiveFormatError::compression(format!("zstd encoder: {}", e)))?;
        encoder
            .include_checksum(true)
            .map_err(|e| ArchiveFormatError::compression(format!("zstd checksum flag: {}", e)))?;
        Ok(Self {
            builder: Builder::new(encoder),
            manifest: RanchSnapshotManifest::new(ranch_id, exported_at),
            next_seq: [0; EntityKind::ALL.len()],
            current_section: None,
            media_started: false,
            media_paths: HashSet::new(),
        })
    }

    /// Manifest as accumulated so far
    pub fn manifest(&self) -> &RanchSnapshotManifest {
        &self.manifest
    }

    /// Append one batch to its section
    ///
    /// Sections must arrive in [`EntityKind::ALL`] order and before any media.
    /// Empty batches are skipped.
    pub fn write_batch(&mut self, records: &BatchRecords) -> ArchiveResult<()> {
        let kind = records.kind();
        let seq = self.next_seq[kind.ordinal()];
        let path = paths::batch(kind, seq);

        if self.media_started {
            return Err(ArchiveFormatError::OutOfOrder {
                path,
                reason: "sections must precede media".to_string(),
            });
        }
        if let Some(current) = self.current_section {
            if kind < current {
                return Err(ArchiveFormatError::OutOfOrder {
                    path,
                    reason: format!("section {} after {}", kind, current),
                });
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        let data = encode_batch(records)?;
        add_file(&mut self.builder, &path, &data)?;

        self.current_section = Some(kind);
        self.next_seq[kind.ordinal()] = seq + 1;
        *self
            .manifest
            .entity_counts
            .entry(kind.as_str().to_string())
            .or_insert(0) += records.len() as u64;
        self.manifest.entity_checksums.insert(path, xxh3_hex(&data));
        Ok(())
    }

    /// Append one media object of exactly `len` bytes
    ///
    /// The caller must know the length up front (the tar header precedes the
    /// data). A reader that ends early leaves the container unusable, so the
    /// error is fatal for the archive.
    pub fn append_media<R: Read>(
        &mut self,
        blob: &BlobPath,
        len: u64,
        reader: R,
    ) -> ArchiveResult<MediaChecksum> {
        let key = blob.to_string();
        let path = paths::media(blob);
        if !self.media_paths.insert(key.clone()) {
            return Err(ArchiveFormatError::invalid_archive(format!(
                "media {} appended twice",
                key
            )));
        }
        self.media_started = true;

        let mut header = Header::new_gnu();
        header.set_size(len);
        header.set_mode(0o644);
        header.set_mtime(0);

        let mut hashing = HashingReader::new(reader.take(len));
        self.builder
            .append_data(&mut header, &path, &mut hashing)
            .map_err(|e| ArchiveFormatError::archive(format!("append '{}': {}", path, e)))?;
        if hashing.bytes_read() != len {
            return Err(ArchiveFormatError::archive(format!(
                "media {} ended after {} of {} bytes",
                key,
                hashing.bytes_read(),
                len
            )));
        }

        let entry = MediaChecksum {
            path: key,
            checksum: hashing.checksum(),
            byte_size: len,
        };
        self.manifest.media_checksums.push(entry.clone());
        Ok(entry)
    }

    /// Record a photo whose bytes could not be collected
    pub fn record_missing(&mut self, missing: MissingMedia) {
        self.manifest.missing_media.push(missing);
    }

    /// Write the manifest and finish compression
    pub fn finish(mut self) -> ArchiveResult<(W, RanchSnapshotManifest)> {
        self.manifest.seal();
        let manifest_json = serde_json::to_vec_pretty(&self.manifest)?;
        add_file(&mut self.builder, paths::MANIFEST, &manifest_json)?;

        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| ArchiveFormatError::archive(format!("tar finish: {}", e)))?;
        let inner = encoder
            .finish()
            .map_err(|e| ArchiveFormatError::compression(format!("zstd finish: {}", e)))?;
        Ok((inner, self.manifest))
    }
}

/// Add an in-memory file to the tar archive
fn add_file<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> ArchiveResult<()> {
    let mut header = Header::new_gnu();
    header
        .set_path(path)
        .map_err(|e| ArchiveFormatError::archive(format!("set path '{}': {}", path, e)))?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0); // Reproducible builds: zero mtime
    header.set_cksum();

    builder
        .append(&header, data)
        .map_err(|e| ArchiveFormatError::archive(format!("append '{}': {}", path, e)))?;

    Ok(())
}

/// Removes the temp file unless disarmed
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Archive writer targeting a file, with atomic write semantics
///
/// Bytes go to a temp sibling; [`ArchiveFileWriter::finish`] renames it into
/// place. Dropping the writer without finishing removes the temp file, so
/// either the complete archive exists or nothing is left behind.
pub struct ArchiveFileWriter {
    // Declared before the guard: the file handle closes before removal.
    writer: ArchiveWriter<BufWriter<File>>,
    guard: TempFileGuard,
    final_path: PathBuf,
}

impl ArchiveFileWriter {
    /// Start writing the archive that will end up at `path`
    pub fn create(
        path: &Path,
        ranch_id: RanchId,
        exported_at: DateTime<Utc>,
        options: &ExportOptions,
    ) -> ArchiveResult<Self> {
        let temp_path = path.with_extension("tmp");

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = File::create(&temp_path)?;
        let guard = TempFileGuard {
            path: temp_path,
            armed: true,
        };
        let writer = ArchiveWriter::new(BufWriter::new(file), ranch_id, exported_at, options)?;
        Ok(Self {
            writer,
            guard,
            final_path: path.to_path_buf(),
        })
    }

    /// Where bytes are written until `finish`
    pub fn temp_path(&self) -> &Path {
        &self.guard.path
    }

    /// Finish the archive and rename it into place
    pub fn finish(self) -> ArchiveResult<ArchiveInfo> {
        let Self {
            writer,
            mut guard,
            final_path,
        } = self;

        let (buf_writer, manifest) = writer.finish()?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| ArchiveFormatError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        // Atomic rename
        fs::rename(&guard.path, &final_path)?;
        guard.armed = false;

        let bundle_size_bytes = fs::metadata(&final_path)?.len();
        let checksum = xxh3_file(&final_path)?;
        debug!(
            target: "ranchvault::archive",
            path = %final_path.display(),
            bytes = bundle_size_bytes,
            records = manifest.total_records(),
            media = manifest.media_checksums.len(),
            "Archive written"
        );

        Ok(ArchiveInfo {
            handle: ArchiveHandle::new(final_path),
            manifest,
            bundle_size_bytes,
            checksum,
        })
    }

    /// Abandon the archive, removing the temp file
    pub fn abort(self) {
        debug!(target: "ranchvault::archive", path = %self.final_path.display(), "Archive aborted");
    }
}

impl Deref for ArchiveFileWriter {
    type Target = ArchiveWriter<BufWriter<File>>;

    fn deref(&self) -> &Self::Target {
        &self.writer
    }
}

impl DerefMut for ArchiveFileWriter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.writer
    }
}

/// Write a complete archive to a Vec<u8> (for testing)
pub fn write_to_vec(
    ranch_id: RanchId,
    batches: &[BatchRecords],
    media: &[(BlobPath, Vec<u8>)],
) -> ArchiveResult<(Vec<u8>, RanchSnapshotManifest)> {
    let mut writer = ArchiveWriter::new(Vec::new(), ranch_id, Utc::now(), &ExportOptions::default())?;
    for batch in batches {
        writer.write_batch(batch)?;
    }
    for (blob, bytes) in media {
        writer.append_media(blob, bytes.len() as u64, &bytes[..])?;
    }
    writer.finish()
}
