pub mod kind_registry;
pub mod notifier;
pub mod query_planner;
pub mod query_set;
pub mod trail;
