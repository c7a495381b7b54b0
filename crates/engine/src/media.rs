//! Media Collector and media transfer helpers
//!
//! Media moves through an anonymous temp file in both directions. On export
//! the spool gives the tar header its length before any byte is appended, so
//! a fetch that breaks mid-stream becomes a missing-media marker instead of a
//! corrupt archive. On restore the spool lets an upload be retried without
//! holding the object in memory.

use crate::cancel::CancellationToken;
use crate::config::{RetryConfig, VaultConfig};
use crate::error::{VaultError, VaultResult};
use crate::progress::{Phase, ProgressReporter};
use crate::retry::with_retry;
use ranchvault_archive::{ArchiveWriter, HashingReader, MissingMedia};
use ranchvault_core::{
    BlobPath, BlobStore, MediaTransferError, PageRequest, PhotoRecord, RanchId, RecordStore,
};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// Copy buffer used when spooling
const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Why a blob could not be spooled
#[derive(Debug)]
pub(crate) enum SpoolError {
    /// Object exceeds the configured limit
    TooLarge {
        /// Limit in bytes
        limit: u64,
    },
    /// Reading the source or writing the temp file failed
    Io(io::Error),
}

impl std::fmt::Display for SpoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpoolError::TooLarge { limit } => write!(f, "too large: exceeds {} bytes", limit),
            SpoolError::Io(e) => write!(f, "read failed: {}", e),
        }
    }
}

impl From<io::Error> for SpoolError {
    fn from(e: io::Error) -> Self {
        SpoolError::Io(e)
    }
}

/// A blob copied to an anonymous temp file
pub(crate) struct SpooledMedia {
    file: File,
    /// Bytes spooled
    pub len: u64,
    /// xxh3 hex of the bytes
    pub checksum: String,
}

impl SpooledMedia {
    /// Copy `reader` to a temp file, hashing as it goes
    ///
    /// Reads at most `limit + 1` bytes so an oversized object is detected
    /// without spooling all of it.
    pub(crate) fn spool<R: Read>(reader: R, limit: u64) -> Result<Self, SpoolError> {
        let file = tempfile::tempfile()?;
        let mut input = HashingReader::new(reader.take(limit.saturating_add(1)));
        let mut output = BufWriter::with_capacity(COPY_BUFFER_BYTES, file);
        io::copy(&mut input, &mut output)?;
        if input.bytes_read() > limit {
            return Err(SpoolError::TooLarge { limit });
        }
        output.flush()?;
        let file = output.into_inner().map_err(|e| e.into_error())?;
        Ok(Self {
            file,
            len: input.bytes_read(),
            checksum: input.checksum(),
        })
    }

    /// Reader over the spooled bytes from the start
    pub(crate) fn reader(&mut self) -> io::Result<&mut File> {
        self.file.seek(SeekFrom::Start(0))?;
        Ok(&mut self.file)
    }
}

/// Upload a spooled blob, retrying up to `attempts` times in total
pub(crate) fn upload_with_retry(
    blobs: &dyn BlobStore,
    path: &BlobPath,
    spooled: &mut SpooledMedia,
    attempts: usize,
    retry: &RetryConfig,
) -> Result<u64, MediaTransferError> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();
    let len = spooled.len;
    for attempt in 0..attempts {
        if attempt > 0 {
            std::thread::sleep(retry.backoff(attempt - 1));
        }
        let reader = match spooled.reader() {
            Ok(reader) => reader,
            Err(e) => return Err(MediaTransferError::new(path, attempt + 1, e)),
        };
        match blobs.put(path, reader, len) {
            Ok(written) if written == len => return Ok(written),
            Ok(written) => {
                last_error = format!("short write: {} of {} bytes", written, len);
            }
            Err(e) => last_error = e.to_string(),
        }
        debug!(
            target: "ranchvault::media",
            path = %path,
            attempt = attempt + 1,
            error = %last_error,
            "Media upload failed"
        );
    }
    Err(MediaTransferError::new(path, attempts, last_error))
}

/// What the Media Collector put into an archive
#[derive(Debug, Clone, Default)]
pub struct MediaReport {
    /// Objects stored
    pub exported: u64,
    /// Bytes stored
    pub bytes: u64,
    /// Photos whose bytes could not be collected
    pub missing: Vec<MissingMedia>,
}

/// Streams every photo's bytes from the Blob Store into an archive
pub struct MediaCollector<'a> {
    records: &'a dyn RecordStore,
    blobs: &'a dyn BlobStore,
    config: &'a VaultConfig,
}

impl<'a> MediaCollector<'a> {
    /// Collector reading from the given stores
    pub fn new(
        records: &'a dyn RecordStore,
        blobs: &'a dyn BlobStore,
        config: &'a VaultConfig,
    ) -> Self {
        Self {
            records,
            blobs,
            config,
        }
    }

    /// Append the media of every photo row of `ranch`
    ///
    /// A photo whose fetch fails is recorded as missing; only archive write
    /// errors, store read errors and cancellation abort the collection.
    pub(crate) fn collect<W: Write>(
        &self,
        ranch: RanchId,
        writer: &mut ArchiveWriter<W>,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> VaultResult<MediaReport> {
        let mut report = MediaReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut request = Some(PageRequest::first(self.config.page_size));

        while let Some(page_request) = request {
            let page = with_retry(&self.config.retry, "photos", || {
                self.records.photos(ranch, page_request)
            })
            .map_err(|e| {
                VaultError::from(ranchvault_core::ExportError::StoreUnavailable {
                    what: "photos".to_string(),
                    attempts: e.attempts,
                    source: e.source,
                })
            })?;

            for photo in &page.items {
                if !seen.insert(photo.storage_path.to_string()) {
                    continue;
                }
                cancel.check()?;
                self.collect_one(photo, writer, &mut report)?;
                progress.advance(Phase::ExportMedia, 1, || {
                    format!(
                        "Exported {} media files ({} missing)",
                        report.exported,
                        report.missing.len()
                    )
                });
            }
            request = page.next_request(self.config.page_size);
        }
        Ok(report)
    }

    fn collect_one<W: Write>(
        &self,
        photo: &PhotoRecord,
        writer: &mut ArchiveWriter<W>,
        report: &mut MediaReport,
    ) -> VaultResult<()> {
        let path = &photo.storage_path;
        let mut spooled = match self.fetch(path) {
            Ok(spooled) => spooled,
            Err(reason) => {
                warn!(
                    target: "ranchvault::media",
                    path = %path,
                    photo_id = %photo.id,
                    reason = %reason,
                    "Media missing from export"
                );
                writer.record_missing(MissingMedia {
                    path: path.to_string(),
                    photo_id: photo.id,
                    reason,
                });
                return Ok(());
            }
        };

        if spooled.len != photo.byte_size {
            warn!(
                target: "ranchvault::media",
                path = %path,
                declared = photo.byte_size,
                streamed = spooled.len,
                "Declared media size differs from stored bytes"
            );
        }

        let len = spooled.len;
        let reader = spooled.reader()?;
        writer.append_media(path, len, reader)?;
        report.exported += 1;
        report.bytes += len;
        Ok(())
    }

    /// Fetch and spool one object; `Err` carries the missing-media reason
    fn fetch(&self, path: &BlobPath) -> Result<SpooledMedia, String> {
        let limit = self.config.max_media_bytes;
        let stream = with_retry(&self.config.retry, "media", || self.blobs.get(path))
            .map_err(|e| format!("fetch failed after {} attempt(s): {}", e.attempts, e.source))?;
        if stream.len > limit {
            return Err(format!(
                "too large: {} bytes exceeds {} bytes",
                stream.len, limit
            ));
        }
        SpooledMedia::spool(stream.reader, limit).map_err(|e| e.to_string())
    }
}
