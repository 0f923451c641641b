use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use crate::core::errors::{Result, TrailError};
use crate::core::models::entity_ref::EntityRef;
use crate::core::models::entry::{
    AssignMode, Entry, EntryId, Insertion, NewEntry, RetargetScope, Target,
};
use crate::core::services::query_planner::QueryPlan;
use crate::core::traits::entry_store::EntryStore;

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<EntryId, Entry>,
    external_keys: HashMap<(String, String), EntryId>,
    last_id: u64,
}

/// Entry store kept entirely in process memory.
///
/// Every operation runs under a single lock, which makes each call atomic
/// the same way a transaction would. Contents are lost when the store is
/// dropped; meant for tests and for applications that only need an
/// in-process trail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| TrailError::StorageFailure {
            detail: "memory store lock poisoned".into(),
        })
    }
}

impl EntryStore for MemoryStore {
    fn insert_entry(&self, entry: &NewEntry) -> Result<Insertion> {
        let mut state = self.lock()?;

        let key = entry
            .external_key
            .as_ref()
            .map(|k| (entry.event_type.clone(), k.clone()));

        if let Some(key) = &key
            && let Some(existing) = state.external_keys.get(key)
        {
            let existing = state.entries.get(existing).cloned().ok_or_else(|| {
                TrailError::StorageFailure {
                    detail: format!("external key index points at missing entry {existing}"),
                }
            })?;
            return Ok(Insertion::Existing(existing));
        }

        state.last_id += 1;
        let id = EntryId(state.last_id);
        let created = entry.clone().into_entry(id, chrono::Utc::now());

        if let Some(key) = key {
            state.external_keys.insert(key, id);
        }
        state.entries.insert(id, created.clone());

        Ok(Insertion::Created(created))
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        Ok(self.lock()?.entries.get(&id).cloned())
    }

    fn upsert_target(
        &self,
        id: EntryId,
        relation_name: &str,
        reference: &EntityRef,
        mode: AssignMode,
    ) -> Result<Target> {
        let mut state = self.lock()?;
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(TrailError::EntryNotFound { id })?;

        entry
            .set_target(relation_name, reference.clone(), mode)
            .cloned()
    }

    fn entry_targets(&self, id: EntryId) -> Result<Vec<Target>> {
        self.lock()?
            .entries
            .get(&id)
            .map(|e| e.targets.clone())
            .ok_or(TrailError::EntryNotFound { id })
    }

    fn retarget(&self, old: &EntityRef, new: &EntityRef, scope: &RetargetScope) -> Result<usize> {
        let mut state = self.lock()?;
        let mut rewritten = 0;

        for entry in state.entries.values_mut() {
            if !scope.includes(entry.id) {
                continue;
            }
            for target in entry.targets.iter_mut().filter(|t| t.reference == *old) {
                target.reference = new.clone();
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    fn find(&self, plan: &QueryPlan) -> Result<Vec<Entry>> {
        let state = self.lock()?;

        let mut matched: Vec<Entry> = state
            .entries
            .values()
            .filter(|e| plan.matches(e))
            .cloned()
            .collect();

        matched.sort_by(Entry::newest_first);
        if let Some(limit) = plan.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn delete_entry(&self, id: EntryId) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(removed) = state.entries.remove(&id) else {
            return Ok(false);
        };
        if let Some(key) = removed.external_key {
            state.external_keys.remove(&(removed.event_type, key));
        }
        Ok(true)
    }
}
