//! Ranch archive reader
//!
//! Opening an archive runs a full streaming verification pass; only a
//! verified archive can be scanned. Scanning reopens the file and yields
//! batches and media entries in archive order.

use crate::batch::{decode_batch, EntityBatch};
use crate::error::{ArchiveFormatError, ArchiveResult};
use crate::types::{
    entity_digest, paths, paths::EntryPath, xxh3_hex, ArchiveVerifyInfo, HashingReader,
    RanchSnapshotManifest, ARCHIVE_FORMAT_VERSION, CHECKSUM_ALGORITHM,
};
use ranchvault_core::{BlobPath, EntityKind};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry};
use tracing::debug;

/// Largest manifest the reader will load
const MAX_MANIFEST_BYTES: u64 = 64 * 1024 * 1024;

/// Largest single batch the reader will load
const MAX_BATCH_BYTES: u64 = 256 * 1024 * 1024;

type ArchiveStream = Archive<zstd::Decoder<'static, BufReader<File>>>;

/// One item yielded by [`ArchiveReader::scan`]
pub enum ArchiveItem<'a> {
    /// A decoded batch of records
    Batch(EntityBatch),
    /// A media object, readable once
    Media(MediaEntry<'a>),
}

/// Media object positioned in the archive stream
///
/// Bytes not read by the visitor are skipped when the scan moves on.
pub struct MediaEntry<'a> {
    /// Blob path the object was exported from
    pub path: BlobPath,
    /// Stored length
    pub size: u64,
    /// Checksum listed in the manifest
    pub expected_checksum: &'a str,
    reader: &'a mut dyn Read,
}

impl Read for MediaEntry<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Whether the visitor wants more items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    /// Keep going
    Continue,
    /// Stop after this item
    Stop,
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every item was visited
    Completed,
    /// The visitor asked to stop
    Stopped,
}

/// Tracks section order while walking entries
#[derive(Default)]
struct OrderCheck {
    current: Option<EntityKind>,
    next_seq: [u32; EntityKind::ALL.len()],
    media_started: bool,
}

impl OrderCheck {
    fn batch(&mut self, path: &str, kind: EntityKind, seq: u32) -> ArchiveResult<()> {
        let out_of_order = |reason: String| ArchiveFormatError::OutOfOrder {
            path: path.to_string(),
            reason,
        };
        if self.media_started {
            return Err(out_of_order("section entry after media".to_string()));
        }
        if let Some(current) = self.current {
            if kind < current {
                return Err(out_of_order(format!("section {} after {}", kind, current)));
            }
        }
        let expected = self.next_seq[kind.ordinal()];
        if seq != expected {
            return Err(out_of_order(format!("expected batch {:06}", expected)));
        }
        self.current = Some(kind);
        self.next_seq[kind.ordinal()] = seq + 1;
        Ok(())
    }

    fn media(&mut self) {
        self.media_started = true;
    }
}

/// Reader for verified ranch archives
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    manifest: RanchSnapshotManifest,
    media_index: HashMap<String, usize>,
}

impl ArchiveReader {
    /// Open and verify an archive
    ///
    /// Checks:
    /// - Archive can be decompressed and is not truncated
    /// - Every entry has a path the format defines, in section order
    /// - Manifest is present, last, and has the supported version
    /// - Manifest digest covers the listed entity checksums
    /// - Every listed batch and media object exists with a matching checksum
    /// - No unlisted entry exists and section counts match
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref();
        let mut archive = open_stream(path)?;

        let mut order = OrderCheck::default();
        let mut manifest_bytes: Option<Vec<u8>> = None;
        let mut batch_checksums: BTreeMap<String, String> = BTreeMap::new();
        let mut counts = [0u64; EntityKind::ALL.len()];
        let mut media: HashMap<String, (String, u64)> = HashMap::new();

        let entries = archive
            .entries()
            .map_err(|e| ArchiveFormatError::from_stream("read entries", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveFormatError::from_stream("read entry", e))?;
            let name = entry_name(&entry)?;
            if manifest_bytes.is_some() {
                return Err(ArchiveFormatError::invalid_archive(format!(
                    "entry {} follows the manifest",
                    name
                )));
            }

            match paths::parse(&name) {
                Some(EntryPath::Manifest) => {
                    manifest_bytes = Some(read_entry(&mut entry, &name, MAX_MANIFEST_BYTES)?);
                }
                Some(EntryPath::Batch { kind, seq }) => {
                    order.batch(&name, kind, seq)?;
                    let data = read_entry(&mut entry, &name, MAX_BATCH_BYTES)?;
                    let batch = decode_batch(&name, kind, seq, &data)?;
                    counts[kind.ordinal()] += batch.records.len() as u64;
                    batch_checksums.insert(name, xxh3_hex(&data));
                }
                Some(EntryPath::Media(blob)) => {
                    order.media();
                    let size = entry.size();
                    let mut hashing = HashingReader::new(&mut entry);
                    io::copy(&mut hashing, &mut io::sink())
                        .map_err(|e| ArchiveFormatError::from_stream(&name, e))?;
                    if hashing.bytes_read() != size {
                        return Err(ArchiveFormatError::truncated(format!(
                            "{} holds {} of {} bytes",
                            name,
                            hashing.bytes_read(),
                            size
                        )));
                    }
                    let checksum = hashing.checksum();
                    if media.insert(blob.to_string(), (checksum, size)).is_some() {
                        return Err(ArchiveFormatError::invalid_archive(format!(
                            "media {} appears twice",
                            name
                        )));
                    }
                }
                None => {
                    return Err(ArchiveFormatError::invalid_archive(format!(
                        "unexpected entry {}",
                        name
                    )));
                }
            }
        }

        // Drain the tar trailer so the zstd frame checksum is checked too
        let mut decoder = archive.into_inner();
        io::copy(&mut decoder, &mut io::sink())
            .map_err(|e| ArchiveFormatError::from_stream("archive trailer", e))?;

        let manifest_bytes =
            manifest_bytes.ok_or_else(|| ArchiveFormatError::missing_file(paths::MANIFEST))?;
        let manifest = parse_manifest(&manifest_bytes)?;

        // Digest over the listed checksums
        let digest = entity_digest(&manifest.entity_checksums);
        if digest != manifest.entity_digest {
            return Err(ArchiveFormatError::ManifestDigestMismatch {
                expected: manifest.entity_digest.clone(),
                actual: digest,
            });
        }

        // Listed batches against what was read
        for (file, expected) in &manifest.entity_checksums {
            let actual = batch_checksums
                .remove(file)
                .ok_or_else(|| ArchiveFormatError::missing_file(file.clone()))?;
            if &actual != expected {
                return Err(ArchiveFormatError::ChecksumMismatch {
                    file: file.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        if let Some(file) = batch_checksums.keys().next() {
            return Err(ArchiveFormatError::invalid_archive(format!(
                "entry {} is not listed in the manifest",
                file
            )));
        }

        // Section counts
        for section in manifest.entity_counts.keys() {
            if EntityKind::parse(section).is_none() {
                return Err(ArchiveFormatError::invalid_archive(format!(
                    "manifest counts unknown section {}",
                    section
                )));
            }
        }
        for kind in EntityKind::ALL {
            let expected = manifest.entity_count(kind);
            let actual = counts[kind.ordinal()];
            if expected != actual {
                return Err(ArchiveFormatError::CountMismatch {
                    section: kind.as_str().to_string(),
                    expected,
                    actual,
                });
            }
        }

        // Media objects
        let mut media_index = HashMap::with_capacity(manifest.media_checksums.len());
        for (idx, listed) in manifest.media_checksums.iter().enumerate() {
            let (actual, size) = media
                .remove(&listed.path)
                .ok_or_else(|| ArchiveFormatError::missing_file(listed.path.clone()))?;
            if actual != listed.checksum {
                return Err(ArchiveFormatError::ChecksumMismatch {
                    file: listed.path.clone(),
                    expected: listed.checksum.clone(),
                    actual,
                });
            }
            if size != listed.byte_size {
                return Err(ArchiveFormatError::invalid_archive(format!(
                    "media {} holds {} bytes, manifest says {}",
                    listed.path, size, listed.byte_size
                )));
            }
            media_index.insert(listed.path.clone(), idx);
        }
        if let Some(file) = media.keys().next() {
            return Err(ArchiveFormatError::invalid_archive(format!(
                "media {} is not listed in the manifest",
                file
            )));
        }

        debug!(
            target: "ranchvault::archive",
            path = %path.display(),
            ranch_id = %manifest.ranch_id,
            records = manifest.total_records(),
            media = manifest.media_checksums.len(),
            "Archive verified"
        );

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
            media_index,
        })
    }

    /// Verify an archive and summarize it
    pub fn validate(path: impl AsRef<Path>) -> ArchiveResult<ArchiveVerifyInfo> {
        Ok(Self::open(path)?.verify_info())
    }

    /// Read the manifest without verifying anything else
    ///
    /// Streams past every entry since the manifest is written last.
    pub fn read_manifest(path: impl AsRef<Path>) -> ArchiveResult<RanchSnapshotManifest> {
        let mut archive = open_stream(path.as_ref())?;
        let entries = archive
            .entries()
            .map_err(|e| ArchiveFormatError::from_stream("read entries", e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveFormatError::from_stream("read entry", e))?;
            let name = entry_name(&entry)?;
            if name == paths::MANIFEST {
                let bytes = read_entry(&mut entry, &name, MAX_MANIFEST_BYTES)?;
                return parse_manifest(&bytes);
            }
        }
        Err(ArchiveFormatError::missing_file(paths::MANIFEST))
    }

    /// Location of the archive
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verified manifest
    pub fn manifest(&self) -> &RanchSnapshotManifest {
        &self.manifest
    }

    /// Summary of the verified archive
    pub fn verify_info(&self) -> ArchiveVerifyInfo {
        ArchiveVerifyInfo {
            ranch_id: self.manifest.ranch_id,
            format_version: self.manifest.format_version,
            entity_counts: self.manifest.entity_counts.clone(),
            media_count: self.manifest.media_checksums.len(),
            missing_media_count: self.manifest.missing_media.len(),
            checksums_valid: true,
        }
    }

    /// Visit every batch and media entry in archive order
    ///
    /// Each call reopens the file, so a scan can be repeated. Batches are
    /// decoded with CRC verification; order is checked again since the file
    /// is re-read.
    pub fn scan<E, F>(&self, mut visitor: F) -> Result<ScanOutcome, E>
    where
        E: From<ArchiveFormatError>,
        F: FnMut(ArchiveItem<'_>) -> Result<ScanControl, E>,
    {
        let mut archive = open_stream(&self.path)?;
        let entries = archive
            .entries()
            .map_err(|e| ArchiveFormatError::from_stream("read entries", e))?;
        let mut order = OrderCheck::default();

        for entry in entries {
            let mut entry = entry.map_err(|e| ArchiveFormatError::from_stream("read entry", e))?;
            let name = entry_name(&entry)?;
            let control = match paths::parse(&name) {
                Some(EntryPath::Manifest) => continue,
                Some(EntryPath::Batch { kind, seq }) => {
                    order.batch(&name, kind, seq)?;
                    let data = read_entry(&mut entry, &name, MAX_BATCH_BYTES)?;
                    let batch = decode_batch(&name, kind, seq, &data)?;
                    visitor(ArchiveItem::Batch(batch))?
                }
                Some(EntryPath::Media(blob)) => {
                    order.media();
                    let key = blob.to_string();
                    let listed = self
                        .media_index
                        .get(&key)
                        .map(|&idx| &self.manifest.media_checksums[idx])
                        .ok_or_else(|| {
                            ArchiveFormatError::invalid_archive(format!(
                                "media {} is not listed in the manifest",
                                key
                            ))
                        })?;
                    let size = entry.size();
                    visitor(ArchiveItem::Media(MediaEntry {
                        path: blob,
                        size,
                        expected_checksum: &listed.checksum,
                        reader: &mut entry,
                    }))?
                }
                None => {
                    return Err(ArchiveFormatError::invalid_archive(format!(
                        "unexpected entry {}",
                        name
                    ))
                    .into());
                }
            };
            if control == ScanControl::Stop {
                return Ok(ScanOutcome::Stopped);
            }
        }
        Ok(ScanOutcome::Completed)
    }
}

fn open_stream(path: &Path) -> ArchiveResult<ArchiveStream> {
    let file = File::open(path)?;
    let decoder = zstd::Decoder::new(file)
        .map_err(|e| ArchiveFormatError::compression(format!("zstd decoder: {}", e)))?;
    Ok(Archive::new(decoder))
}

fn entry_name<R: Read>(entry: &Entry<'_, R>) -> ArchiveResult<String> {
    let path = entry
        .path()
        .map_err(|e| ArchiveFormatError::archive(format!("entry path: {}", e)))?;
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| ArchiveFormatError::invalid_archive("entry path is not UTF-8"))
}

fn read_entry<R: Read>(entry: &mut Entry<'_, R>, name: &str, limit: u64) -> ArchiveResult<Vec<u8>> {
    let size = entry.size();
    if size > limit {
        return Err(ArchiveFormatError::invalid_archive(format!(
            "{} is {} bytes, limit is {}",
            name, size, limit
        )));
    }
    let mut data = Vec::with_capacity(size as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| ArchiveFormatError::from_stream(name, e))?;
    if data.len() as u64 != size {
        return Err(ArchiveFormatError::truncated(format!(
            "{} holds {} of {} bytes",
            name,
            data.len(),
            size
        )));
    }
    Ok(data)
}

/// Parse the manifest, checking the version before the full shape
fn parse_manifest(bytes: &[u8]) -> ArchiveResult<RanchSnapshotManifest> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let version = value
        .get("formatVersion")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ArchiveFormatError::invalid_archive("manifest has no formatVersion"))?;
    if version != u64::from(ARCHIVE_FORMAT_VERSION) {
        return Err(ArchiveFormatError::UnsupportedVersion {
            version: u32::try_from(version).unwrap_or(u32::MAX),
            supported: ARCHIVE_FORMAT_VERSION,
        });
    }

    let manifest: RanchSnapshotManifest = serde_json::from_value(value)?;
    if manifest.checksum_algorithm != CHECKSUM_ALGORITHM {
        return Err(ArchiveFormatError::invalid_archive(format!(
            "unsupported checksum algorithm {}",
            manifest.checksum_algorithm
        )));
    }
    Ok(manifest)
}
