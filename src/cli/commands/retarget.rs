use papertrail::core::errors::Result;
use papertrail::core::models::entity_ref::EntityRef;
use papertrail::core::models::entry::{EntryId, RetargetScope};

use crate::cli::commands::trail_helpers::open_trail;
use crate::cli::output;

/// Execute the `papertrail retarget` command.
///
/// Without `--entry`, every target in the trail pointing at `old` moves.
pub fn execute(old: &str, new: &str, entries: &[u64]) -> Result<()> {
    let old: EntityRef = old.parse()?;
    let new: EntityRef = new.parse()?;
    let scope = if entries.is_empty() {
        RetargetScope::All
    } else {
        RetargetScope::Entries(entries.iter().copied().map(EntryId).collect())
    };

    let (_, trail) = open_trail()?;
    let rewritten = trail.retarget_globally(&old, &new, &scope)?;

    if rewritten == 0 {
        output::warning(&format!("No targets point at {old}"));
    } else {
        output::success(&format!("Rewrote {rewritten} target(s): {old} → {new}"));
    }
    Ok(())
}
