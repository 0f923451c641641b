use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use colored::Colorize;

use papertrail::config::app_config::{AppConfig, ConfiguredTrail};
use papertrail::core::errors::{Result, TrailError};
use papertrail::core::models::entity_ref::EntityRef;
use papertrail::core::models::entry::Entry;

use crate::cli::context;

/// Load the config and open the trail it describes.
pub fn open_trail() -> Result<(AppConfig, ConfiguredTrail)> {
    let trail_dir = context::trail_dir();
    if !trail_dir.exists() {
        return Err(TrailError::InvalidConfig {
            detail: format!(
                "No trail at {}. Run 'papertrail init' first.",
                trail_dir.display()
            ),
        });
    }

    let config = AppConfig::load(trail_dir)?;
    let trail = config.open_trail(trail_dir)?;
    Ok((config, trail))
}

/// Parse `name=kind:id`. The name may be empty (anonymous relation).
pub fn parse_named_reference(s: &str) -> Result<(String, EntityRef)> {
    let (name, reference) = s.split_once('=').ok_or_else(|| TrailError::InvalidReference {
        input: s.to_string(),
    })?;
    Ok((name.trim().to_string(), reference.parse()?))
}

/// Parse `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }

    let invalid = || TrailError::InvalidInput {
        detail: format!(
            "date '{s}' is not YYYY-MM-DD or RFC 3339, e.g. 2026-01-15 or 2026-01-15T10:30:00Z"
        ),
    };
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())?;
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(invalid)?;
    Ok(Utc.from_utc_datetime(&midnight))
}

/// Print a single entry as a formatted row.
pub fn print_entry(entry: &Entry) {
    let date = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
    let targets = if entry.targets.is_empty() {
        "—".dimmed().to_string()
    } else {
        entry
            .targets
            .iter()
            .map(|t| format!("{}={}", display_name(&t.relation_name), t.reference))
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!(
        "  {} {} {:>5} {:<18} {} {}",
        date.to_string().dimmed(),
        "│".dimmed(),
        format!("#{}", entry.id).dimmed(),
        entry.event_type.cyan(),
        entry.message,
        targets.dimmed(),
    );
}

/// The anonymous relation is stored as the empty string.
pub fn display_name(relation_name: &str) -> &str {
    if relation_name.is_empty() {
        "<anonymous>"
    } else {
        relation_name
    }
}
