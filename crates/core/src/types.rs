//! Identifier and path types shared by every layer
//!
//! Ranch-scoped identifiers are plain `u64` newtypes so they serialize as bare
//! integers in both the msgpack batches and the JSON manifest. `BlobPath` is
//! the `ranch/animal/filename` key used by the live Blob Store and mirrored
//! inside archives.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw integer value
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Tenant identifier. Every record and blob belongs to exactly one ranch.
    RanchId
);

id_type!(
    /// Identifier of an [`AnimalRecord`](crate::records::AnimalRecord), unique per ranch
    AnimalId
);

id_type!(
    /// Identifier of a subordinate or configuration record
    /// (medical entry, custom-field definition/value, photo), unique per
    /// entity type within a ranch
    RecordId
);

/// Error returned when a string is not a valid `ranch/animal/filename` path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid blob path '{path}': {reason}")]
pub struct BlobPathError {
    /// The rejected input
    pub path: String,
    /// Why it was rejected
    pub reason: &'static str,
}

/// Location of a media object in the Blob Store: `<ranch>/<animal>/<filename>`
///
/// The same layout is used for media entries inside an archive so that a
/// restore can rewrite only the ranch and animal components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobPath {
    /// Owning ranch
    pub ranch: RanchId,
    /// Owning animal
    pub animal: AnimalId,
    /// File name, never containing a separator
    pub filename: String,
}

impl BlobPath {
    /// Build a path, validating the filename component
    pub fn new(
        ranch: RanchId,
        animal: AnimalId,
        filename: impl Into<String>,
    ) -> Result<Self, BlobPathError> {
        let filename = filename.into();
        validate_filename(&filename).map_err(|reason| BlobPathError {
            path: format!("{}/{}/{}", ranch, animal, filename),
            reason,
        })?;
        Ok(Self {
            ranch,
            animal,
            filename,
        })
    }

    /// Same filename relocated under another ranch and animal
    pub fn relocate(&self, ranch: RanchId, animal: AnimalId) -> Self {
        Self {
            ranch,
            animal,
            filename: self.filename.clone(),
        }
    }
}

fn validate_filename(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty filename");
    }
    if name == "." || name == ".." {
        return Err("relative filename");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("filename contains a separator");
    }
    if name.contains('\0') {
        return Err("filename contains NUL");
    }
    Ok(())
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.ranch, self.animal, self.filename)
    }
}

impl FromStr for BlobPath {
    type Err = BlobPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| BlobPathError {
            path: s.to_string(),
            reason,
        };
        let mut parts = s.splitn(3, '/');
        let ranch = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(|| err("ranch component is not an integer"))?;
        let animal = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(|| err("animal component is not an integer"))?;
        let filename = parts.next().ok_or_else(|| err("missing filename"))?;
        Self::new(RanchId(ranch), AnimalId(animal), filename).map_err(|e| err(e.reason))
    }
}

impl TryFrom<String> for BlobPath {
    type Error = BlobPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BlobPath> for String {
    fn from(path: BlobPath) -> Self {
        path.to_string()
    }
}
