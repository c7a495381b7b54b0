//! Section batch codec
//!
//! Every store page exported by the Snapshot Builder becomes one batch file
//! inside its entity section.
//!
//! ## Format
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Header (16 bytes)                                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Magic: "RANCH_BATCH" (11 bytes)                                 │
//! │ Version: u16 (2 bytes, LE) (must be 1)                          │
//! │ Section tag: u8 (1 byte)                                        │
//! │ Reserved: [u8; 2] (zero)                                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Frame                                                           │
//! │   Length: u32 (4 bytes, LE)                                     │
//! │   Data: [u8; length] (msgpack-serialized Vec<record>)           │
//! │   CRC32: u32 (4 bytes, LE)                                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{ArchiveFormatError, ArchiveResult};
use crate::types::{BATCH_MAGIC, BATCH_VERSION};
use ranchvault_core::{
    AnimalRecord, CustomFieldDefinition, CustomFieldValue, EntityKind, MedicalHistoryRecord,
    PhotoRecord, RanchSettings,
};
use serde::de::DeserializeOwned;

/// Header size in bytes: magic (11) + version (2) + tag (1) + reserved (2)
pub const HEADER_SIZE: usize = 16;

/// Frame overhead: length prefix + trailing CRC
const FRAME_OVERHEAD: usize = 8;

/// Records of one section, typed
#[derive(Debug, Clone, PartialEq)]
pub enum BatchRecords {
    /// Ranch settings (at most one row per archive)
    Settings(Vec<RanchSettings>),
    /// Custom field definitions
    CustomFieldDefinitions(Vec<CustomFieldDefinition>),
    /// Animals
    Animals(Vec<AnimalRecord>),
    /// Medical history
    MedicalHistory(Vec<MedicalHistoryRecord>),
    /// Custom field values
    CustomFieldValues(Vec<CustomFieldValue>),
    /// Photo metadata rows
    Photos(Vec<PhotoRecord>),
}

impl BatchRecords {
    /// Section these records belong to
    pub fn kind(&self) -> EntityKind {
        match self {
            BatchRecords::Settings(_) => EntityKind::Settings,
            BatchRecords::CustomFieldDefinitions(_) => EntityKind::CustomFieldDefinitions,
            BatchRecords::Animals(_) => EntityKind::Animals,
            BatchRecords::MedicalHistory(_) => EntityKind::MedicalHistory,
            BatchRecords::CustomFieldValues(_) => EntityKind::CustomFieldValues,
            BatchRecords::Photos(_) => EntityKind::Photos,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        match self {
            BatchRecords::Settings(v) => v.len(),
            BatchRecords::CustomFieldDefinitions(v) => v.len(),
            BatchRecords::Animals(v) => v.len(),
            BatchRecords::MedicalHistory(v) => v.len(),
            BatchRecords::CustomFieldValues(v) => v.len(),
            BatchRecords::Photos(v) => v.len(),
        }
    }

    /// True when the batch holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn payload(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        match self {
            BatchRecords::Settings(v) => rmp_serde::to_vec_named(v),
            BatchRecords::CustomFieldDefinitions(v) => rmp_serde::to_vec_named(v),
            BatchRecords::Animals(v) => rmp_serde::to_vec_named(v),
            BatchRecords::MedicalHistory(v) => rmp_serde::to_vec_named(v),
            BatchRecords::CustomFieldValues(v) => rmp_serde::to_vec_named(v),
            BatchRecords::Photos(v) => rmp_serde::to_vec_named(v),
        }
    }

    fn from_payload(kind: EntityKind, data: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        Ok(match kind {
            EntityKind::Settings => BatchRecords::Settings(decode_vec(data)?),
            EntityKind::CustomFieldDefinitions => {
                BatchRecords::CustomFieldDefinitions(decode_vec(data)?)
            }
            EntityKind::Animals => BatchRecords::Animals(decode_vec(data)?),
            EntityKind::MedicalHistory => BatchRecords::MedicalHistory(decode_vec(data)?),
            EntityKind::CustomFieldValues => BatchRecords::CustomFieldValues(decode_vec(data)?),
            EntityKind::Photos => BatchRecords::Photos(decode_vec(data)?),
        })
    }
}

fn decode_vec<T: DeserializeOwned>(data: &[u8]) -> Result<Vec<T>, rmp_serde::decode::Error> {
    rmp_serde::from_slice(data)
}

/// One decoded batch file
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch {
    /// Sequence number within its section
    pub seq: u32,
    /// Decoded records
    pub records: BatchRecords,
}

impl EntityBatch {
    /// Section of this batch
    pub fn kind(&self) -> EntityKind {
        self.records.kind()
    }
}

/// Encode a batch file
pub fn encode_batch(records: &BatchRecords) -> ArchiveResult<Vec<u8>> {
    let payload = records.payload().map_err(|e| {
        ArchiveFormatError::serialization(format!("msgpack encode {}: {}", records.kind(), e))
    })?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        ArchiveFormatError::serialization(format!(
            "{} batch too large: {} bytes",
            records.kind(),
            payload.len()
        ))
    })?;

    let mut buffer = Vec::with_capacity(HEADER_SIZE + FRAME_OVERHEAD + payload.len());
    buffer.extend_from_slice(BATCH_MAGIC);
    buffer.extend_from_slice(&BATCH_VERSION.to_le_bytes());
    buffer.push(records.kind().tag());
    buffer.extend_from_slice(&[0, 0]);

    let crc = crc32fast::hash(&payload);
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(&payload);
    buffer.extend_from_slice(&crc.to_le_bytes());
    Ok(buffer)
}

/// Decode a batch file, validating header, section tag and CRC
///
/// `path` is only used in error messages; `expected` is the section the
/// archive path claims the batch belongs to.
pub fn decode_batch(
    path: &str,
    expected: EntityKind,
    seq: u32,
    data: &[u8],
) -> ArchiveResult<EntityBatch> {
    let invalid = |reason: String| ArchiveFormatError::InvalidBatch {
        path: path.to_string(),
        reason,
    };

    if data.len() < HEADER_SIZE + FRAME_OVERHEAD {
        return Err(invalid(format!("too short: {} bytes", data.len())));
    }

    // Validate magic
    if &data[0..11] != BATCH_MAGIC {
        return Err(invalid("invalid magic".to_string()));
    }

    // Parse version
    let version = u16::from_le_bytes([data[11], data[12]]);
    if version != BATCH_VERSION {
        return Err(invalid(format!("unsupported batch version {}", version)));
    }

    let kind = EntityKind::from_tag(data[13])
        .ok_or_else(|| invalid(format!("unknown section tag {}", data[13])))?;
    if kind != expected {
        return Err(invalid(format!(
            "section tag {} does not match path section {}",
            kind, expected
        )));
    }

    if data[14] != 0 || data[15] != 0 {
        return Err(invalid("reserved header bytes are not zero".to_string()));
    }

    let body = &data[HEADER_SIZE..];
    let len = u32::from_le_bytes([body[0], body[1], body[2], body[3]]) as usize;
    if body.len() != len + FRAME_OVERHEAD {
        return Err(invalid(format!(
            "frame length {} does not match {} payload bytes",
            len,
            body.len() - FRAME_OVERHEAD
        )));
    }

    let payload = &body[4..4 + len];
    let stored_crc = u32::from_le_bytes([
        body[4 + len],
        body[5 + len],
        body[6 + len],
        body[7 + len],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if stored_crc != computed_crc {
        return Err(invalid(format!(
            "CRC mismatch: expected {:08x}, got {:08x}",
            stored_crc, computed_crc
        )));
    }

    let records = BatchRecords::from_payload(kind, payload)
        .map_err(|e| invalid(format!("msgpack decode: {}", e)))?;
    Ok(EntityBatch { seq, records })
}
