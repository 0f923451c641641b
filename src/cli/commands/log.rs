use papertrail::core::errors::Result;
use papertrail::core::models::entity_ref::EntityRef;
use papertrail::core::models::entry::Entry;
use papertrail::core::models::query::{EntryQuery, Relations};

use crate::cli::commands::trail_helpers::{open_trail, parse_date, parse_named_reference, print_entry};
use crate::cli::output;

/// Arguments of `papertrail log`.
pub struct LogArgs<'a> {
    pub event_type: Option<&'a str>,
    pub type_prefix: Option<&'a str>,
    pub related: &'a [String],
    pub related_as: &'a [String],
    pub since: Option<&'a str>,
    pub until: Option<&'a str>,
    pub contains: Option<&'a str>,
    pub last: Option<usize>,
    pub json: bool,
}

impl LogArgs<'_> {
    fn has_filters(&self) -> bool {
        self.event_type.is_some()
            || self.type_prefix.is_some()
            || !self.related.is_empty()
            || !self.related_as.is_empty()
            || self.since.is_some()
            || self.until.is_some()
            || self.contains.is_some()
    }
}

/// Execute the `papertrail log` command.
///
/// Displays entries newest first, narrowed by relation and attribute
/// filters. Every filter must hold.
pub fn execute(args: LogArgs<'_>) -> Result<()> {
    let query = build_query(&args)?;
    let (_, trail) = open_trail()?;

    let entries = trail.query(query).fetch()?;

    if args.json {
        for entry in &entries {
            print_json(entry)?;
        }
        return Ok(());
    }

    if entries.is_empty() {
        output::header("papertrail log");
        output::warning("No entries found");
        if args.has_filters() {
            println!("  Try removing filters to see all entries.");
        }
        return Ok(());
    }

    output::header(&format!("papertrail log ({} entries)", entries.len()));
    println!();

    for entry in &entries {
        print_entry(entry);
    }

    Ok(())
}

fn build_query(args: &LogArgs<'_>) -> Result<EntryQuery> {
    let mut relations = Relations::new();
    for raw in args.related {
        relations = relations.any(raw.parse::<EntityRef>()?);
    }
    for raw in args.related_as {
        let (name, reference) = parse_named_reference(raw)?;
        relations = relations.named(name, reference);
    }

    let mut query = EntryQuery::new().related_to(relations);
    if let Some(event_type) = args.event_type {
        query = query.event_type(event_type);
    }
    if let Some(prefix) = args.type_prefix {
        query = query.event_type_prefix(prefix);
    }
    if let Some(since) = args.since {
        query = query.since(parse_date(since)?);
    }
    if let Some(until) = args.until {
        query = query.until(parse_date(until)?);
    }
    if let Some(needle) = args.contains {
        query = query.message_contains(needle);
    }
    if let Some(n) = args.last {
        query = query.limit(n);
    }
    Ok(query)
}

fn print_json(entry: &Entry) -> Result<()> {
    let line = serde_json::to_string(entry).map_err(std::io::Error::from)?;
    println!("{line}");
    Ok(())
}
