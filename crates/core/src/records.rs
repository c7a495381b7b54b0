//! Ranch record types
//!
//! These are the rows the engine moves between the Record Store and an
//! archive. Parent links (`mother_id`/`father_id`) and the owning-animal
//! references on subordinate records are weak: nothing here enforces that
//! they resolve.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{AnimalId, BlobPath, RecordId};

/// Biological sex of an animal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    /// Female
    Female,
    /// Male
    Male,
    /// Not recorded
    #[default]
    Unknown,
}

/// Herd status of an animal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnimalStatus {
    /// Currently on the ranch
    #[default]
    Active,
    /// Sold off the ranch
    Sold,
    /// Died
    Deceased,
    /// Removed from the herd
    Culled,
}

/// One animal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalRecord {
    /// Identifier, unique per ranch
    pub id: AnimalId,
    /// Ear tag; the natural identity operators recognise
    pub tag: String,
    /// Optional display name
    pub name: Option<String>,
    /// Sex
    pub sex: Sex,
    /// Birth date if known
    pub birth_date: Option<NaiveDate>,
    /// Herd status
    pub status: AnimalStatus,
    /// Dam, if recorded
    pub mother_id: Option<AnimalId>,
    /// Sire, if recorded
    pub father_id: Option<AnimalId>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl AnimalRecord {
    /// Minimal record with only an id and tag; used heavily by tests
    pub fn new(id: AnimalId, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            name: None,
            sex: Sex::Unknown,
            birth_date: None,
            status: AnimalStatus::Active,
            mother_id: None,
            father_id: None,
            notes: None,
        }
    }

    /// Builder-style setter for both parent links
    pub fn with_parents(mut self, mother: Option<AnimalId>, father: Option<AnimalId>) -> Self {
        self.mother_id = mother;
        self.father_id = father;
        self
    }

    /// Iterate over the non-null parent links
    pub fn parent_ids(&self) -> impl Iterator<Item = AnimalId> {
        self.mother_id.into_iter().chain(self.father_id)
    }
}

/// Treatment, vaccination or vet visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalHistoryRecord {
    /// Identifier
    pub id: RecordId,
    /// Owning animal
    pub animal_id: AnimalId,
    /// Date of the event
    pub recorded_on: NaiveDate,
    /// Category, e.g. "vaccination"
    pub kind: String,
    /// Details
    pub description: String,
    /// Vet or hand who administered it
    pub administered_by: Option<String>,
}

/// Value type of a custom field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text
    Text,
    /// Numeric
    Number,
    /// Calendar date
    Date,
    /// Yes/no
    Boolean,
}

/// Ranch-defined extra column for animals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    /// Identifier
    pub id: RecordId,
    /// Label shown in forms
    pub name: String,
    /// Value type
    pub field_type: FieldType,
    /// Whether forms require a value
    pub required: bool,
}

/// Value of a custom field for one animal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValue {
    /// Identifier
    pub id: RecordId,
    /// Owning animal
    pub animal_id: AnimalId,
    /// Bound definition
    pub field_id: RecordId,
    /// Stored value, rendered as text
    pub value: String,
}

/// Photo metadata; the bytes live in the Blob Store under `storage_path`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Identifier
    pub id: RecordId,
    /// Owning animal
    pub animal_id: AnimalId,
    /// Blob Store location
    pub storage_path: BlobPath,
    /// MIME type
    pub media_type: String,
    /// Declared size in bytes
    pub byte_size: u64,
    /// Primary photo shown on the animal card
    pub is_primary: bool,
    /// Set when the bytes are known to be missing from the Blob Store
    #[serde(default)]
    pub media_missing: bool,
}

/// Ranch-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RanchSettings {
    /// Display name of the ranch
    pub ranch_name: String,
    /// IANA time zone
    pub timezone: String,
    /// "kg" or "lb"
    pub weight_unit: String,
    /// Everything else the settings form stores
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Entity types, in the order they are written to an archive
///
/// Readers rely on this order: configuration first, then animals, then the
/// records that reference animals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// [`RanchSettings`]
    Settings,
    /// [`CustomFieldDefinition`]
    CustomFieldDefinitions,
    /// [`AnimalRecord`]
    Animals,
    /// [`MedicalHistoryRecord`]
    MedicalHistory,
    /// [`CustomFieldValue`]
    CustomFieldValues,
    /// [`PhotoRecord`]
    Photos,
}

impl EntityKind {
    /// All kinds in archive order
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Settings,
        EntityKind::CustomFieldDefinitions,
        EntityKind::Animals,
        EntityKind::MedicalHistory,
        EntityKind::CustomFieldValues,
        EntityKind::Photos,
    ];

    /// Stable name used in archive paths and manifest keys
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Settings => "settings",
            EntityKind::CustomFieldDefinitions => "custom_field_definitions",
            EntityKind::Animals => "animals",
            EntityKind::MedicalHistory => "medical_history",
            EntityKind::CustomFieldValues => "custom_field_values",
            EntityKind::Photos => "photos",
        }
    }

    /// Inverse of [`EntityKind::as_str`]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// One-byte tag stored in batch headers
    pub fn tag(self) -> u8 {
        self as u8 + 1
    }

    /// Inverse of [`EntityKind::tag`]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Position in the archive order
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
