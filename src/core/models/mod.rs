pub mod entity_ref;
pub mod entry;
pub mod query;
