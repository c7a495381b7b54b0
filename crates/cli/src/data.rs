//! Ranch data directory backing `export` and `restore`.
//!
//! Layout: `records.json` holds every ranch's rows, `media/` holds the
//! photo bytes under their blob paths.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ranchvault_core::RanchId;
use ranchvault_storage::{FsBlobStore, MemoryRecordStore};

pub const RECORDS_FILE: &str = "records.json";
pub const MEDIA_DIR: &str = "media";

/// Stores opened from a data directory.
pub struct DataDir {
    root: PathBuf,
    pub records: Arc<MemoryRecordStore>,
    pub blobs: Arc<FsBlobStore>,
}

impl DataDir {
    /// Open `root`, starting empty if it holds no records yet.
    pub fn open(root: &Path) -> Result<Self> {
        let records_path = root.join(RECORDS_FILE);
        let records = if records_path.exists() {
            MemoryRecordStore::load(&records_path)
                .with_context(|| format!("Failed to load {}", records_path.display()))?
        } else {
            MemoryRecordStore::new()
        };
        let media = root.join(MEDIA_DIR);
        let blobs = FsBlobStore::open(&media)
            .with_context(|| format!("Failed to open {}", media.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
            records: Arc::new(records),
            blobs: Arc::new(blobs),
        })
    }

    /// Register `ranch` unless it already exists.
    pub fn ensure_ranch(&self, ranch: RanchId) {
        self.records.create_ranch(ranch);
    }

    /// Write the records back to `records.json`.
    pub fn save(&self) -> Result<()> {
        let path = self.root.join(RECORDS_FILE);
        self.records
            .save(&path)
            .with_context(|| format!("Failed to save {}", path.display()))
    }
}
