use crate::core::errors::Result;
use crate::core::models::entry::Entry;
use crate::core::traits::listener::RecordListener;

/// Logs every newly recorded entry at `info`.
///
/// Enabled from `[notify] log_recorded` in the config.
#[derive(Debug, Clone, Default)]
pub struct TracingListener {
    target_detail: bool,
}

impl TracingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log each target as `name=kind:id`.
    pub fn with_target_detail(mut self) -> Self {
        self.target_detail = true;
        self
    }

    fn describe_targets(entry: &Entry) -> String {
        entry
            .targets
            .iter()
            .map(|t| format!("{}={}", t.relation_name, t.reference))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl RecordListener for TracingListener {
    fn on_recorded(&self, entry: &Entry) -> Result<()> {
        if self.target_detail {
            tracing::info!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                targets = %Self::describe_targets(entry),
                "{}",
                entry.message
            );
        } else {
            tracing::info!(
                entry_id = %entry.id,
                event_type = %entry.event_type,
                "{}",
                entry.message
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
