//! Blob Store implementations
//!
//! - `MemoryBlobStore`: DashMap of shared byte buffers, for tests and embedding
//! - `FsBlobStore`: directory tree mirroring the `ranch/animal/filename` layout
//!
//! Both enforce an optional per-object size ceiling the way the hosted store
//! does, and both stream writes through `Read::take` so a caller never has to
//! materialise the object first.

use dashmap::DashMap;
use ranchvault_core::{BlobPath, BlobStore, BlobStream, StoreError, StoreResult};
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Shared immutable buffer handed out to readers
#[derive(Debug, Clone)]
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

fn check_size(path: &BlobPath, len: u64, limit: Option<u64>) -> StoreResult<()> {
    match limit {
        Some(max) if len > max => Err(StoreError::rejected(format!(
            "{} is {} bytes, limit is {}",
            path, len, max
        ))),
        _ => Ok(()),
    }
}

/// In-memory [`BlobStore`]
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: DashMap<BlobPath, SharedBytes>,
    max_object_bytes: Option<u64>,
}

impl MemoryBlobStore {
    /// Create an empty store without a size limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that rejects objects above `max` bytes
    pub fn with_limit(max: u64) -> Self {
        Self {
            objects: DashMap::new(),
            max_object_bytes: Some(max),
        }
    }

    /// Store bytes directly
    pub fn insert(&self, path: BlobPath, data: Vec<u8>) {
        self.objects.insert(path, SharedBytes(Arc::new(data)));
    }

    /// Copy of the stored bytes
    pub fn bytes(&self, path: &BlobPath) -> Option<Vec<u8>> {
        self.objects.get(path).map(|b| b.0.to_vec())
    }

    /// Whether an object exists
    pub fn contains(&self, path: &BlobPath) -> bool {
        self.objects.contains_key(path)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, path: &BlobPath) -> StoreResult<BlobStream> {
        let bytes = self
            .objects
            .get(path)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::not_found(path.to_string()))?;
        Ok(BlobStream {
            len: bytes.0.len() as u64,
            reader: Box::new(Cursor::new(bytes)),
        })
    }

    fn put(&self, path: &BlobPath, reader: &mut dyn Read, len: u64) -> StoreResult<u64> {
        check_size(path, len, self.max_object_bytes)?;
        let mut data = Vec::new();
        Read::take(&mut *reader, len).read_to_end(&mut data)?;
        if data.len() as u64 != len {
            return Err(StoreError::rejected(format!(
                "short body for {}: expected {} bytes, got {}",
                path,
                len,
                data.len()
            )));
        }
        let written = data.len() as u64;
        self.insert(path.clone(), data);
        Ok(written)
    }
}

/// Filesystem-backed [`BlobStore`]
///
/// Objects live at `<root>/<ranch>/<animal>/<filename>`. Writes go to a
/// sibling temp file and are renamed into place.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    max_object_bytes: Option<u64>,
}

impl FsBlobStore {
    /// Store rooted at `root`; the directory is created if missing
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            max_object_bytes: None,
        })
    }

    /// Set a per-object size ceiling
    pub fn with_limit(mut self, max: u64) -> Self {
        self.max_object_bytes = Some(max);
        self
    }

    /// Filesystem location of a blob
    pub fn file_path(&self, path: &BlobPath) -> PathBuf {
        self.root
            .join(path.ranch.to_string())
            .join(path.animal.to_string())
            .join(&path.filename)
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, path: &BlobPath) -> StoreResult<BlobStream> {
        let file_path = self.file_path(path);
        let file = File::open(&file_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::not_found(path.to_string()),
            _ => StoreError::Io(e),
        })?;
        let len = file.metadata()?.len();
        Ok(BlobStream {
            len,
            reader: Box::new(io::BufReader::new(file)),
        })
    }

    fn put(&self, path: &BlobPath, reader: &mut dyn Read, len: u64) -> StoreResult<u64> {
        check_size(path, len, self.max_object_bytes)?;
        let final_path = self.file_path(path);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = final_path.with_file_name(format!("{}.part", path.filename));

        let result = (|| -> StoreResult<u64> {
            let mut out = BufWriter::new(File::create(&temp_path)?);
            let written = io::copy(&mut Read::take(&mut *reader, len), &mut out)?;
            out.flush()?;
            if written != len {
                return Err(StoreError::rejected(format!(
                    "short body for {}: expected {} bytes, got {}",
                    path, len, written
                )));
            }
            Ok(written)
        })();

        match result {
            Ok(written) => {
                fs::rename(&temp_path, &final_path)?;
                debug!(target: "ranchvault::blob", path = %path, bytes = written, "Blob stored");
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }
}
