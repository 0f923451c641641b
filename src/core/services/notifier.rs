use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::models::entry::Entry;
use crate::core::traits::listener::RecordListener;

/// Synchronous fan-out of `on_recorded` to every subscribed listener.
///
/// Each listener runs in isolation: an error or a panic in one is logged
/// and does not stop the others.
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<Arc<dyn RecordListener>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Arc<dyn RecordListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `entry` to all listeners. Returns how many succeeded.
    pub fn notify(&self, entry: &Entry) -> usize {
        // Snapshot so listeners may subscribe others without deadlocking.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut delivered = 0;
        for listener in &listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_recorded(entry))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => tracing::warn!(
                    listener = listener.name(),
                    entry_id = %entry.id,
                    error = %e,
                    "record listener failed"
                ),
                Err(_) => tracing::warn!(
                    listener = listener.name(),
                    entry_id = %entry.id,
                    "record listener panicked"
                ),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.len())
            .finish()
    }
}
