use std::any::Any;

use crate::core::errors::Result;
use crate::core::models::entity_ref::EntityId;

/// An application type that can be the target of an entry.
///
/// The trail never stores the entity itself, only its kind and id.
pub trait Entity: Any + Send + Sync {
    /// Primary key of this instance.
    fn entity_id(&self) -> EntityId;
}

/// Port for resolving an id back to a live entity.
///
/// Returns `Ok(None)` when the entity no longer exists; a stale id is a
/// normal outcome, not an error.
pub trait EntityLookup<E>: Send + Sync {
    fn find(&self, id: &EntityId) -> Result<Option<E>>;
}

impl<E, F> EntityLookup<E> for F
where
    F: Fn(&EntityId) -> Result<Option<E>> + Send + Sync,
{
    fn find(&self, id: &EntityId) -> Result<Option<E>> {
        self(id)
    }
}
