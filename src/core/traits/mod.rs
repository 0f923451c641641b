pub mod entity;
pub mod entry_store;
pub mod listener;
