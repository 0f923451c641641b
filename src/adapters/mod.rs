pub mod listeners;
pub mod stores;
