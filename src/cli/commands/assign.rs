use papertrail::core::errors::Result;
use papertrail::core::models::entity_ref::EntityRef;
use papertrail::core::models::entry::{AssignMode, EntryId};

use crate::cli::commands::trail_helpers::{display_name, open_trail};
use crate::cli::output;

/// Execute the `papertrail assign` command.
pub fn execute(id: u64, name: &str, reference: &str, no_replace: bool) -> Result<()> {
    let reference: EntityRef = reference.parse()?;
    let mode = if no_replace {
        AssignMode::NoReplace
    } else {
        AssignMode::Replace
    };

    let (_, trail) = open_trail()?;
    let target = trail.assign_target(EntryId(id), name, reference, mode)?;

    output::success(&format!(
        "Entry #{}: {} → {}",
        target.entry_id,
        display_name(&target.relation_name),
        target.reference
    ));
    Ok(())
}
