//! ID Reconciliation Map
//!
//! Restore runs two passes over an archive. The first builds an
//! [`ArchiveIndex`] holding only identifiers: which animals exist, their
//! parent links, which definitions are carried. Identity assignment turns the
//! index into a [`ReconciliationMap`], a flat table from archived animal id to
//! [`Resolution`]. Every later lookup is a one hash access, so parent cycles
//! in the data cannot make resolution loop.

use crate::config::CollisionPolicy;
use crate::error::VaultResult;
use ranchvault_archive::{BatchRecords, EntityBatch};
use ranchvault_core::{AnimalId, EntityKind, RanchId, RecordId, ReconciliationError};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::BTreeMap;

/// Identifiers gathered by the consistency pass
#[derive(Debug, Default)]
pub struct ArchiveIndex {
    /// Archived animal ids in archive order
    animals: Vec<AnimalId>,
    animal_set: FxHashSet<AnimalId>,
    /// Parent links of animals that have at least one
    parents: FxHashMap<AnimalId, (Option<AnimalId>, Option<AnimalId>)>,
    definitions: FxHashSet<RecordId>,
    /// Ids of subordinate rows, for the duplicate check
    subordinates: FxHashMap<EntityKind, FxHashSet<RecordId>>,
    settings_rows: usize,
}

impl ArchiveIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one decoded batch into the index
    pub fn observe(&mut self, batch: &EntityBatch) -> Result<(), ReconciliationError> {
        match &batch.records {
            BatchRecords::Settings(rows) => {
                self.settings_rows += rows.len();
                if self.settings_rows > 1 {
                    return Err(ReconciliationError::MultipleSettings(self.settings_rows));
                }
            }
            BatchRecords::CustomFieldDefinitions(rows) => {
                for def in rows {
                    if !self.definitions.insert(def.id) {
                        return Err(duplicate(EntityKind::CustomFieldDefinitions, def.id.get()));
                    }
                }
            }
            BatchRecords::Animals(rows) => {
                for animal in rows {
                    if !self.animal_set.insert(animal.id) {
                        return Err(duplicate(EntityKind::Animals, animal.id.get()));
                    }
                    self.animals.push(animal.id);
                    if animal.mother_id.is_some() || animal.father_id.is_some() {
                        self.parents
                            .insert(animal.id, (animal.mother_id, animal.father_id));
                    }
                }
            }
            BatchRecords::MedicalHistory(rows) => {
                self.observe_ids(EntityKind::MedicalHistory, rows.iter().map(|r| r.id))?;
            }
            BatchRecords::CustomFieldValues(rows) => {
                self.observe_ids(EntityKind::CustomFieldValues, rows.iter().map(|r| r.id))?;
            }
            BatchRecords::Photos(rows) => {
                self.observe_ids(EntityKind::Photos, rows.iter().map(|r| r.id))?;
            }
        }
        Ok(())
    }

    fn observe_ids(
        &mut self,
        kind: EntityKind,
        ids: impl Iterator<Item = RecordId>,
    ) -> Result<(), ReconciliationError> {
        let seen = self.subordinates.entry(kind).or_default();
        for id in ids {
            if !seen.insert(id) {
                return Err(duplicate(kind, id.get()));
            }
        }
        Ok(())
    }

    /// Archived animal ids in archive order
    pub fn animals(&self) -> &[AnimalId] {
        &self.animals
    }

    /// Whether the archive carries this animal
    pub fn has_animal(&self, id: AnimalId) -> bool {
        self.animal_set.contains(&id)
    }

    /// Whether the archive carries this custom-field definition
    pub fn has_definition(&self, id: RecordId) -> bool {
        self.definitions.contains(&id)
    }

    /// Number of settings rows seen
    pub fn settings_rows(&self) -> usize {
        self.settings_rows
    }
}

fn duplicate(kind: EntityKind, id: u64) -> ReconciliationError {
    ReconciliationError::DuplicateIdentifier { kind, id }
}

/// What happens to one archived animal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Inserted under the given target id
    Insert(AnimalId),
    /// Live animal with the given id is updated in place
    Overwrite(AnimalId),
    /// Duplicate of a live animal; the record and its subordinates are skipped
    Skip,
}

impl Resolution {
    /// Target id when the animal is written
    pub fn target(self) -> Option<AnimalId> {
        match self {
            Resolution::Insert(id) | Resolution::Overwrite(id) => Some(id),
            Resolution::Skip => None,
        }
    }
}

/// Where a subordinate record goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Attach to this target animal
    To(AnimalId),
    /// Owner was skipped as a duplicate
    OwnerSkipped,
    /// Owner is not in the archive; the record is dropped
    Orphan,
}

/// Counters kept while resolving references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStats {
    /// Parent links that resolved to nothing and were set to null
    pub parent_links_nulled: u64,
    /// Subordinate records dropped for an unresolvable owner, per section
    pub orphans: BTreeMap<String, u64>,
}

impl ReconciliationStats {
    /// Total records dropped
    pub fn records_dropped(&self) -> u64 {
        self.orphans.values().sum()
    }
}

/// Archived animal id -> resolution, plus the parent table to rewrite
#[derive(Debug)]
pub struct ReconciliationMap {
    resolutions: FxHashMap<AnimalId, Resolution>,
    parents: FxHashMap<AnimalId, (Option<AnimalId>, Option<AnimalId>)>,
    definitions: FxHashSet<RecordId>,
    stats: ReconciliationStats,
}

impl ReconciliationMap {
    /// Identity assignment against a live ranch (missing mode)
    ///
    /// An archived id is reused verbatim unless a live animal already holds
    /// it; then `policy` decides. Only `live_exists` is called, so a `Fail`
    /// policy reports its conflict before anything is written.
    pub fn against_live(
        index: ArchiveIndex,
        ranch: RanchId,
        policy: CollisionPolicy,
        mut live_exists: impl FnMut(AnimalId) -> VaultResult<bool>,
    ) -> VaultResult<Self> {
        let mut resolutions = FxHashMap::default();
        resolutions.reserve(index.animals.len());
        for &id in &index.animals {
            let resolution = if !live_exists(id)? {
                Resolution::Insert(id)
            } else {
                match policy {
                    CollisionPolicy::Skip => Resolution::Skip,
                    CollisionPolicy::Overwrite => Resolution::Overwrite(id),
                    CollisionPolicy::Fail => {
                        return Err(ReconciliationError::IdentityConflict { ranch, id }.into())
                    }
                }
            };
            resolutions.insert(id, resolution);
        }
        Ok(Self::from_parts(index, resolutions))
    }

    /// Identity assignment into an emptied ranch (replace mode)
    ///
    /// Every archived animal gets a fresh id from `allocate`.
    pub fn fresh(
        index: ArchiveIndex,
        mut allocate: impl FnMut() -> VaultResult<AnimalId>,
    ) -> VaultResult<Self> {
        let mut resolutions = FxHashMap::default();
        resolutions.reserve(index.animals.len());
        for &id in &index.animals {
            resolutions.insert(id, Resolution::Insert(allocate()?));
        }
        Ok(Self::from_parts(index, resolutions))
    }

    fn from_parts(index: ArchiveIndex, resolutions: FxHashMap<AnimalId, Resolution>) -> Self {
        Self {
            resolutions,
            parents: index.parents,
            definitions: index.definitions,
            stats: ReconciliationStats::default(),
        }
    }

    /// Resolution of an archived animal
    pub fn resolve(&self, archived: AnimalId) -> Option<Resolution> {
        self.resolutions.get(&archived).copied()
    }

    /// Where a subordinate of `owner` goes; orphans are counted under `kind`
    pub fn attach(&mut self, kind: EntityKind, owner: AnimalId) -> Attachment {
        match self.resolutions.get(&owner) {
            Some(Resolution::Insert(id)) | Some(Resolution::Overwrite(id)) => Attachment::To(*id),
            Some(Resolution::Skip) => Attachment::OwnerSkipped,
            None => {
                self.count_orphan(kind);
                Attachment::Orphan
            }
        }
    }

    /// Count a record dropped for a reason other than its owner
    pub fn count_orphan(&mut self, kind: EntityKind) {
        *self.stats.orphans.entry(kind.as_str().to_string()).or_insert(0) += 1;
    }

    /// Whether the archive carried this definition
    pub fn archived_definition(&self, id: RecordId) -> bool {
        self.definitions.contains(&id)
    }

    /// Rewritten parent links for every written animal that had any
    ///
    /// Yields `(target, mother, father)`. Links to skipped or absent animals
    /// become `None` and are counted.
    pub fn rewritten_parents(&mut self) -> Vec<(AnimalId, Option<AnimalId>, Option<AnimalId>)> {
        let mut out = Vec::with_capacity(self.parents.len());
        let mut nulled = 0u64;
        for (child, (mother, father)) in &self.parents {
            let Some(target) = self.resolutions.get(child).and_then(|r| r.target()) else {
                continue;
            };
            let mut link = |parent: Option<AnimalId>| {
                let parent = parent?;
                let resolved = self.resolutions.get(&parent).and_then(|r| r.target());
                if resolved.is_none() {
                    nulled += 1;
                }
                resolved
            };
            let mother = link(*mother);
            let father = link(*father);
            out.push((target, mother, father));
        }
        self.stats.parent_links_nulled += nulled;
        out.sort_by_key(|(target, _, _)| *target);
        out
    }

    /// Statistics so far
    pub fn stats(&self) -> &ReconciliationStats {
        &self.stats
    }

    /// Number of archived animals
    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    /// Whether the archive carried no animals
    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }
}
