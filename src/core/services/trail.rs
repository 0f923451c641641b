use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::core::errors::Result;
use crate::core::models::entity_ref::EntityRef;
use crate::core::models::entry::{
    AssignMode, Entry, EntryId, Insertion, NewEntry, RetargetScope, Target,
};
use crate::core::models::query::{EntryQuery, RelatedTo, Relations};
use crate::core::services::kind_registry::{KindRegistry, ResolvedEntity};
use crate::core::services::notifier::Notifier;
use crate::core::services::query_set::QuerySet;
use crate::core::traits::entity::Entity;
use crate::core::traits::entry_store::EntryStore;
use crate::core::traits::listener::RecordListener;

/// What a target currently points at.
#[derive(Debug, Clone)]
pub enum TargetResolution {
    Live(ResolvedEntity),
    /// The reference is stored but its entity no longer resolves.
    Unresolved(EntityRef),
}

impl TargetResolution {
    pub fn reference(&self) -> &EntityRef {
        match self {
            Self::Live(resolved) => resolved.reference(),
            Self::Unresolved(reference) => reference,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

/// The audit trail: single write path, relation queries and target
/// management over an `EntryStore`.
///
/// Holds no state of its own besides the kind registry and listeners;
/// everything durable lives in the store.
pub struct Trail<S: EntryStore> {
    store: S,
    registry: KindRegistry,
    notifier: Notifier,
}

impl<S: EntryStore> Trail<S> {
    pub fn new(store: S, registry: KindRegistry) -> Self {
        Self {
            store,
            registry,
            notifier: Notifier::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    /// Register an `on_recorded` hook.
    pub fn subscribe(&self, listener: Arc<dyn RecordListener>) {
        self.notifier.subscribe(listener);
    }

    /// Canonical reference for a live entity of a registered type.
    pub fn reference_for<E: Entity>(&self, entity: &E) -> Result<EntityRef> {
        self.registry.reference_for(entity)
    }

    /// Query constraint matching exactly this entity.
    pub fn related<E: Entity>(&self, entity: &E) -> Result<RelatedTo> {
        Ok(RelatedTo::reference(self.reference_for(entity)?))
    }

    // ─── Recording ───────────────────────────────────────────────────

    /// Record an event. See `record_outcome`.
    pub fn record(&self, entry: NewEntry) -> Result<Entry> {
        Ok(self.record_outcome(entry)?.into_entry())
    }

    /// Record an event and report whether it was created or already there.
    ///
    /// The entry and its initial targets are written in one atomic store
    /// call. When `(event_type, external_key)` already exists the call is a
    /// no-op: no targets are touched and listeners are not notified.
    ///
    /// # Errors
    ///
    /// - `UnregisteredKind` if a target's kind is not registered.
    /// - Any storage error, unchanged.
    pub fn record_outcome(&self, mut entry: NewEntry) -> Result<Insertion> {
        for (_, reference) in &entry.targets {
            self.registry.check(reference)?;
        }
        entry.timestamp.get_or_insert_with(Utc::now);

        let insertion = self.store.insert_entry(&entry)?;
        match &insertion {
            Insertion::Created(created) => {
                tracing::info!(
                    entry_id = %created.id,
                    event_type = %created.event_type,
                    targets = created.targets.len(),
                    "entry recorded"
                );
                self.notifier.notify(created);
            }
            Insertion::Existing(existing) => {
                tracing::debug!(
                    entry_id = %existing.id,
                    event_type = %existing.event_type,
                    external_key = ?existing.external_key,
                    "external key already recorded, skipping"
                );
            }
        }
        Ok(insertion)
    }

    // ─── Reading ─────────────────────────────────────────────────────

    /// Every entry, newest first.
    pub fn entries(&self) -> QuerySet<'_, S> {
        self.query(EntryQuery::new())
    }

    pub fn query(&self, query: EntryQuery) -> QuerySet<'_, S> {
        QuerySet::new(&self.store, query)
    }

    /// Entries related to every constraint in `relations`.
    pub fn related_to(&self, relations: Relations) -> QuerySet<'_, S> {
        self.entries().related_to(relations)
    }

    pub fn get(&self, id: EntryId) -> Result<Option<Entry>> {
        self.store.get_entry(id)
    }

    /// Remove an entry and its targets.
    pub fn delete(&self, id: EntryId) -> Result<bool> {
        let deleted = self.store.delete_entry(id)?;
        if deleted {
            tracing::info!(entry_id = %id, "entry deleted");
        }
        Ok(deleted)
    }

    // ─── Targets ─────────────────────────────────────────────────────

    /// Create or replace the target `relation_name` on an entry.
    ///
    /// Takes an explicit reference so that entities which may no longer
    /// exist can still be targeted.
    ///
    /// # Errors
    ///
    /// - `DuplicateTarget` with `AssignMode::NoReplace` on a taken name.
    /// - `UnregisteredKind`, `EntryNotFound`, storage errors.
    pub fn assign_target(
        &self,
        id: EntryId,
        relation_name: &str,
        reference: EntityRef,
        mode: AssignMode,
    ) -> Result<Target> {
        self.registry.check(&reference)?;
        let target = self.store.upsert_target(id, relation_name, &reference, mode)?;
        tracing::debug!(entry_id = %id, relation_name, reference = %reference, "target assigned");
        Ok(target)
    }

    /// Same as `assign_target`, for a live entity.
    pub fn assign_entity<E: Entity>(
        &self,
        id: EntryId,
        relation_name: &str,
        entity: &E,
        mode: AssignMode,
    ) -> Result<Target> {
        let reference = self.reference_for(entity)?;
        self.assign_target(id, relation_name, reference, mode)
    }

    /// Whether the entry has a target under this name, resolvable or not.
    pub fn has_target(&self, id: EntryId, relation_name: &str) -> Result<bool> {
        Ok(self.target_reference(id, relation_name)?.is_some())
    }

    pub fn target_reference(&self, id: EntryId, relation_name: &str) -> Result<Option<EntityRef>> {
        Ok(self
            .store
            .entry_targets(id)?
            .into_iter()
            .find(|t| t.relation_name == relation_name)
            .map(|t| t.reference))
    }

    /// Live entity behind a target.
    ///
    /// `None` both when there is no such target and when its entity does
    /// not resolve; use `has_target` to tell them apart.
    pub fn get_target<E: Entity + Clone>(&self, id: EntryId, relation_name: &str) -> Result<Option<E>> {
        match self.target_reference(id, relation_name)? {
            Some(reference) => self.registry.resolve_as::<E>(&reference),
            None => Ok(None),
        }
    }

    /// Type-erased variant of `get_target`.
    pub fn resolve_target(&self, id: EntryId, relation_name: &str) -> Result<Option<ResolvedEntity>> {
        match self.target_reference(id, relation_name)? {
            Some(reference) => self.registry.resolve(&reference),
            None => Ok(None),
        }
    }

    /// Every target of an entry keyed by relation name.
    pub fn targets_map(&self, id: EntryId) -> Result<BTreeMap<String, TargetResolution>> {
        let mut map = BTreeMap::new();
        for target in self.store.entry_targets(id)? {
            let resolution = match self.registry.resolve(&target.reference)? {
                Some(resolved) => TargetResolution::Live(resolved),
                None => TargetResolution::Unresolved(target.reference),
            };
            map.insert(target.relation_name, resolution);
        }
        Ok(map)
    }

    /// Point every target equal to `old` within `scope` at `new`, e.g.
    /// after merging two entities. Returns the number of rewritten targets.
    pub fn retarget_globally(
        &self,
        old: &EntityRef,
        new: &EntityRef,
        scope: &RetargetScope,
    ) -> Result<usize> {
        self.registry.check(new)?;
        let rewritten = self.store.retarget(old, new, scope)?;
        tracing::info!(old = %old, new = %new, rewritten, "targets rewritten");
        Ok(rewritten)
    }
}

impl<S: EntryStore + std::fmt::Debug> std::fmt::Debug for Trail<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trail")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("notifier", &self.notifier)
            .finish()
    }
}
