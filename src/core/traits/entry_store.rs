use crate::core::errors::Result;
use crate::core::models::entity_ref::EntityRef;
use crate::core::models::entry::{
    AssignMode, Entry, EntryId, Insertion, NewEntry, RetargetScope, Target,
};
use crate::core::services::query_planner::QueryPlan;

/// Port for the durable storage of entries and their targets.
///
/// Implementations live in `adapters::stores` (e.g. MemoryStore,
/// SqliteStore). Every method is atomic on its own: a reader never sees an
/// entry with half of its targets, and a failed call leaves nothing behind.
pub trait EntryStore: Send + Sync {
    /// Insert an entry together with its initial targets.
    ///
    /// When `external_key` is set and an entry with the same
    /// `(event_type, external_key)` exists, nothing is written and the
    /// existing entry comes back as `Insertion::Existing`. The check and
    /// the insert must be one atomic step. `entry.timestamp` is always set
    /// by the caller.
    fn insert_entry(&self, entry: &NewEntry) -> Result<Insertion>;

    /// Fetch one entry with its targets.
    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>>;

    /// Create or replace the target `relation_name` on an entry.
    fn upsert_target(
        &self,
        id: EntryId,
        relation_name: &str,
        reference: &EntityRef,
        mode: AssignMode,
    ) -> Result<Target>;

    /// Targets of an entry in assignment order.
    fn entry_targets(&self, id: EntryId) -> Result<Vec<Target>>;

    /// Point every target equal to `old` within `scope` at `new`.
    /// Returns the number of rewritten targets.
    fn retarget(&self, old: &EntityRef, new: &EntityRef, scope: &RetargetScope) -> Result<usize>;

    /// Entries matching the plan, newest first, at most `plan.limit`.
    fn find(&self, plan: &QueryPlan) -> Result<Vec<Entry>>;

    /// Remove an entry and all of its targets. `false` if it did not exist.
    fn delete_entry(&self, id: EntryId) -> Result<bool>;
}

impl<T: EntryStore + ?Sized> EntryStore for Box<T> {
    fn insert_entry(&self, entry: &NewEntry) -> Result<Insertion> {
        (**self).insert_entry(entry)
    }

    fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        (**self).get_entry(id)
    }

    fn upsert_target(
        &self,
        id: EntryId,
        relation_name: &str,
        reference: &EntityRef,
        mode: AssignMode,
    ) -> Result<Target> {
        (**self).upsert_target(id, relation_name, reference, mode)
    }

    fn entry_targets(&self, id: EntryId) -> Result<Vec<Target>> {
        (**self).entry_targets(id)
    }

    fn retarget(&self, old: &EntityRef, new: &EntityRef, scope: &RetargetScope) -> Result<usize> {
        (**self).retarget(old, new, scope)
    }

    fn find(&self, plan: &QueryPlan) -> Result<Vec<Entry>> {
        (**self).find(plan)
    }

    fn delete_entry(&self, id: EntryId) -> Result<bool> {
        (**self).delete_entry(id)
    }
}
