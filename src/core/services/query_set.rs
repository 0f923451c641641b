use crate::core::errors::Result;
use crate::core::models::entry::{order_and_dedup, Entry, EntryId};
use crate::core::models::query::{EntryQuery, Predicate, Relations};
use crate::core::services::query_planner::QueryPlanner;
use crate::core::traits::entry_store::EntryStore;

/// Lazy view over the entries matching a query.
///
/// Nothing is read until `fetch` (or one of its shorthands) runs, and
/// every call reissues the query against the store, so a `QuerySet` can
/// be kept around and re-evaluated. Results are always in the default
/// order and free of duplicates.
pub struct QuerySet<'a, S: EntryStore + ?Sized> {
    store: &'a S,
    query: EntryQuery,
}

impl<'a, S: EntryStore + ?Sized> QuerySet<'a, S> {
    pub fn new(store: &'a S, query: EntryQuery) -> Self {
        Self { store, query }
    }

    pub fn query(&self) -> &EntryQuery {
        &self.query
    }

    /// Narrow to entries related to every constraint in `relations`.
    #[must_use]
    pub fn related_to(self, relations: Relations) -> Self {
        Self {
            store: self.store,
            query: self.query.related_to(relations),
        }
    }

    /// Narrow by an arbitrary predicate, e.g. an OR of relations.
    #[must_use]
    pub fn filter(self, predicate: Predicate) -> Self {
        Self {
            store: self.store,
            query: self.query.filter(predicate),
        }
    }

    #[must_use]
    pub fn limit(self, limit: usize) -> Self {
        Self {
            store: self.store,
            query: self.query.limit(limit),
        }
    }

    /// Run the query.
    pub fn fetch(&self) -> Result<Vec<Entry>> {
        let plan = QueryPlanner.plan(&self.query);
        if plan.is_unsatisfiable() {
            return Ok(Vec::new());
        }

        let mut entries = self.store.find(&plan)?;
        order_and_dedup(&mut entries);
        if let Some(limit) = plan.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    pub fn iter(&self) -> Result<std::vec::IntoIter<Entry>> {
        Ok(self.fetch()?.into_iter())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.fetch()?.len())
    }

    pub fn exists(&self) -> Result<bool> {
        Ok(self.first()?.is_some())
    }

    /// Newest matching entry.
    pub fn first(&self) -> Result<Option<Entry>> {
        let newest = Self {
            store: self.store,
            query: self.query.clone().limit(1),
        };
        Ok(newest.fetch()?.into_iter().next())
    }

    pub fn ids(&self) -> Result<Vec<EntryId>> {
        Ok(self.fetch()?.into_iter().map(|e| e.id).collect())
    }
}

impl<S: EntryStore + ?Sized> Clone for QuerySet<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            query: self.query.clone(),
        }
    }
}
