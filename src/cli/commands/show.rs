use colored::Colorize;

use papertrail::core::errors::{Result, TrailError};
use papertrail::core::models::entry::EntryId;
use papertrail::core::services::trail::TargetResolution;

use crate::cli::commands::trail_helpers::{display_name, open_trail};
use crate::cli::output;

/// Execute the `papertrail show` command.
///
/// Prints one entry with its payload and targets. Targets are marked
/// `unresolved` when their entity cannot be looked up, which from the CLI
/// is always the case since it has no live lookups.
pub fn execute(id: u64) -> Result<()> {
    let (_, trail) = open_trail()?;
    let id = EntryId(id);

    let entry = trail.get(id)?.ok_or(TrailError::EntryNotFound { id })?;

    output::header(&format!("Entry #{}", entry.id));
    output::field("time", &entry.timestamp.to_rfc3339());
    output::field("type", &entry.event_type);
    output::field("message", &entry.message);
    if let Some(key) = &entry.external_key {
        output::field("external key", key);
    }
    if let Some(data) = &entry.data {
        let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        output::field("data", &pretty.replace('\n', "\n               "));
    }

    let targets = trail.targets_map(id)?;
    if targets.is_empty() {
        output::field("targets", &"—".dimmed().to_string());
        return Ok(());
    }

    println!("\n  {}", "Targets".bold());
    // Assignment order, not name order.
    for target in &entry.targets {
        let marker = match targets.get(&target.relation_name) {
            Some(TargetResolution::Live(_)) => "live".green().to_string(),
            _ => "unresolved".yellow().to_string(),
        };
        println!(
            "    {:<14} → {} ({marker})",
            display_name(&target.relation_name),
            target.reference,
        );
    }

    Ok(())
}
