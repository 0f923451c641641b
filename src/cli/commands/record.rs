use papertrail::core::errors::{Result, TrailError};
use papertrail::core::models::entry::{Insertion, NewEntry};

use crate::cli::commands::trail_helpers::{open_trail, parse_date, parse_named_reference};
use crate::cli::output;

/// Arguments of `papertrail record`.
pub struct RecordArgs<'a> {
    pub event_type: &'a str,
    pub message: &'a str,
    pub data: Option<&'a str>,
    pub at: Option<&'a str>,
    pub targets: &'a [String],
    pub external_key: Option<&'a str>,
}

/// Execute the `papertrail record` command.
pub fn execute(args: RecordArgs<'_>) -> Result<()> {
    let entry = build_entry(&args)?;
    let (_, trail) = open_trail()?;

    match trail.record_outcome(entry)? {
        Insertion::Created(entry) => {
            output::success(&format!(
                "Recorded entry #{} ({}, {} target(s))",
                entry.id,
                entry.event_type,
                entry.targets.len()
            ));
        }
        Insertion::Existing(entry) => {
            output::warning(&format!(
                "Entry #{} already recorded for external key '{}', nothing written",
                entry.id,
                entry.external_key.as_deref().unwrap_or_default()
            ));
        }
    }
    Ok(())
}

fn build_entry(args: &RecordArgs<'_>) -> Result<NewEntry> {
    let mut entry = NewEntry::new(args.event_type, args.message);

    if let Some(raw) = args.data {
        let data = serde_json::from_str(raw).map_err(|e| TrailError::InvalidInput {
            detail: format!("--data is not valid JSON: {e}"),
        })?;
        entry = entry.with_data(data);
    }
    if let Some(at) = args.at {
        entry = entry.with_timestamp(parse_date(at)?);
    }
    if let Some(key) = args.external_key {
        entry = entry.with_external_key(key);
    }
    for raw in args.targets {
        let (name, reference) = parse_named_reference(raw)?;
        entry = entry.with_target(name, reference);
    }
    Ok(entry)
}
