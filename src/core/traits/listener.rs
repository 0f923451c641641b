use crate::core::errors::Result;
use crate::core::models::entry::Entry;

/// Subscriber invoked after an entry has been committed.
///
/// Delivery is best-effort: a failing listener is logged and skipped, it
/// never rolls back the write or reaches the caller of `record`.
pub trait RecordListener: Send + Sync {
    fn on_recorded(&self, entry: &Entry) -> Result<()>;

    /// Name used when reporting failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> RecordListener for F
where
    F: Fn(&Entry) -> Result<()> + Send + Sync,
{
    fn on_recorded(&self, entry: &Entry) -> Result<()> {
        self(entry)
    }
}
