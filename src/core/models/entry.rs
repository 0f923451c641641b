use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, TrailError};
use crate::core::models::entity_ref::EntityRef;

/// Store-assigned identifier of an entry. Monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named relation from an entry to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub entry_id: EntryId,
    pub relation_name: String,
    pub reference: EntityRef,
}

/// What to do when a relation name is already taken on an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignMode {
    /// Overwrite the existing target.
    #[default]
    Replace,
    /// Fail with `DuplicateTarget` and leave the existing target alone.
    NoReplace,
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub external_key: Option<String>,
    pub targets: Vec<Target>,
}

impl Entry {
    /// Key used for both the default ordering and deduplication.
    pub fn ordering_key(&self) -> (DateTime<Utc>, EntryId) {
        (self.timestamp, self.id)
    }

    /// Newest first; equal timestamps fall back to the higher id.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.ordering_key().cmp(&a.ordering_key())
    }

    pub fn target(&self, relation_name: &str) -> Option<&Target> {
        self.targets
            .iter()
            .find(|t| t.relation_name == relation_name)
    }

    pub fn has_target(&self, relation_name: &str) -> bool {
        self.target(relation_name).is_some()
    }

    /// Upsert a target on this in-memory snapshot.
    ///
    /// A replaced target keeps its position in `targets`.
    pub fn set_target(
        &mut self,
        relation_name: &str,
        reference: EntityRef,
        mode: AssignMode,
    ) -> Result<&Target> {
        let entry_id = self.id;
        let idx = match self
            .targets
            .iter()
            .position(|t| t.relation_name == relation_name)
        {
            Some(_) if mode == AssignMode::NoReplace => {
                return Err(TrailError::DuplicateTarget {
                    entry_id,
                    relation_name: relation_name.to_string(),
                });
            }
            Some(idx) => {
                self.targets[idx].reference = reference;
                idx
            }
            None => {
                self.targets.push(Target {
                    entry_id,
                    relation_name: relation_name.to_string(),
                    reference,
                });
                self.targets.len() - 1
            }
        };
        Ok(&self.targets[idx])
    }
}

/// Sort into the default order and drop repeated entries.
///
/// Deduplicates on `(timestamp, id)`, the same key the ordering uses, so
/// removing duplicates never reorders anything.
pub fn order_and_dedup(entries: &mut Vec<Entry>) {
    entries.sort_by(Entry::newest_first);
    entries.dedup_by_key(|e| e.ordering_key());
}

/// An entry that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub event_type: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    /// `None` means "now", filled in by the trail at record time.
    pub timestamp: Option<DateTime<Utc>>,
    pub external_key: Option<String>,
    /// Initial targets as `(relation_name, reference)`, names unique.
    pub targets: Vec<(String, EntityRef)>,
}

impl NewEntry {
    pub fn new(event_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            message: message.into(),
            data: None,
            timestamp: None,
            external_key: None,
            targets: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_external_key(mut self, key: impl Into<String>) -> Self {
        self.external_key = Some(key.into());
        self
    }

    /// Add an initial target. Reusing a name replaces the earlier reference.
    pub fn with_target(mut self, relation_name: impl Into<String>, reference: EntityRef) -> Self {
        let relation_name = relation_name.into();
        match self
            .targets
            .iter_mut()
            .find(|(name, _)| *name == relation_name)
        {
            Some(slot) => slot.1 = reference,
            None => self.targets.push((relation_name, reference)),
        }
        self
    }

    /// Materialize into an `Entry` once the store has picked an id.
    pub fn into_entry(self, id: EntryId, timestamp: DateTime<Utc>) -> Entry {
        let targets = self
            .targets
            .into_iter()
            .map(|(relation_name, reference)| Target {
                entry_id: id,
                relation_name,
                reference,
            })
            .collect();

        Entry {
            id,
            timestamp: self.timestamp.unwrap_or(timestamp),
            event_type: self.event_type,
            message: self.message,
            data: self.data,
            external_key: self.external_key,
            targets,
        }
    }
}

/// Result of the store's atomic get-or-create.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    Created(Entry),
    /// `(event_type, external_key)` already existed; nothing was written.
    Existing(Entry),
}

impl Insertion {
    pub fn entry(&self) -> &Entry {
        match self {
            Self::Created(e) | Self::Existing(e) => e,
        }
    }

    pub fn into_entry(self) -> Entry {
        match self {
            Self::Created(e) | Self::Existing(e) => e,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Which entries a bulk retarget touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RetargetScope {
    #[default]
    All,
    Entries(BTreeSet<EntryId>),
}

impl RetargetScope {
    pub fn includes(&self, id: EntryId) -> bool {
        match self {
            Self::All => true,
            Self::Entries(ids) => ids.contains(&id),
        }
    }
}
