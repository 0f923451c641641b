//! Event audit trail: entries recording what happened, named targets
//! pointing at the entities involved, and relation queries over both.
//!
//! ```no_run
//! use papertrail::prelude::*;
//!
//! let mut kinds = KindRegistry::new();
//! kinds.register_kind("auth.user")?;
//! let trail = Trail::new(MemoryStore::new(), kinds);
//!
//! let alice = EntityRef::new("auth.user", 1);
//! trail.record(NewEntry::new("login", "Alice logged in").with_target("user", alice.clone()))?;
//!
//! let logins = trail.related_to(Relations::new().any(alice)).count()?;
//! assert_eq!(logins, 1);
//! # Ok::<(), papertrail::core::errors::TrailError>(())
//! ```

pub mod adapters;
pub mod config;
pub mod core;

/// The types most callers need.
pub mod prelude {
    pub use crate::adapters::listeners::tracing_listener::TracingListener;
    pub use crate::adapters::stores::memory_store::MemoryStore;
    pub use crate::adapters::stores::sqlite_store::SqliteStore;
    pub use crate::core::errors::{Result, TrailError};
    pub use crate::core::models::entity_ref::{EntityId, EntityKind, EntityRef};
    pub use crate::core::models::entry::{
        AssignMode, Entry, EntryId, Insertion, NewEntry, RetargetScope, Target,
    };
    pub use crate::core::models::query::{EntryQuery, Predicate, RelatedTo, Relations};
    pub use crate::core::services::kind_registry::{KindRegistry, ResolvedEntity};
    pub use crate::core::services::query_set::QuerySet;
    pub use crate::core::services::trail::{TargetResolution, Trail};
    pub use crate::core::traits::entity::{Entity, EntityLookup};
    pub use crate::core::traits::entry_store::EntryStore;
    pub use crate::core::traits::listener::RecordListener;
}
