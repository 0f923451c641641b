use papertrail::config::app_config::{AppConfig, StoreBackend, CONFIG_FILE};
use papertrail::core::errors::{Result, TrailError};

use crate::cli::{context, output};

/// Execute the `papertrail init` command.
///
/// Creates the trail directory, writes `config.toml` with the given kinds,
/// and creates the empty store.
pub fn execute(kinds: &[String], verbose: bool) -> Result<()> {
    let trail_dir = context::trail_dir();

    if trail_dir.exists() {
        return Err(TrailError::InvalidConfig {
            detail: format!(
                "A trail is already initialized here ({} exists)",
                trail_dir.display()
            ),
        });
    }

    let mut config = AppConfig::new(Vec::new());
    for kind in kinds {
        config.add_kind(kind)?;
    }

    output::header("papertrail: initializing trail");

    std::fs::create_dir_all(trail_dir)?;
    output::success(&format!("Created {}/", trail_dir.display()));

    config.save(trail_dir)?;
    output::success(&format!("Generated {CONFIG_FILE} with defaults"));

    // Opening the store creates the database and its schema.
    config.open_store(trail_dir)?;
    if config.store.backend == StoreBackend::Sqlite {
        output::success(&format!("Created store {}", config.store.database));
    }

    if config.kind_names().is_empty() {
        output::warning("No entity kinds registered");
        println!("  Run 'papertrail kinds add <kind>' before recording targets.");
    } else {
        output::success(&format!("Registered kinds: {}", config.kind_names().join(", ")));
    }

    output::success("Trail ready.\n");
    print_next_steps(verbose);

    Ok(())
}

/// Print next steps after init.
fn print_next_steps(verbose: bool) {
    println!("  Next steps:");
    println!("     1. Record an event: papertrail record user-created \"Alice signed up\" --target user=auth.user:1");
    println!("     2. Browse the trail: papertrail log --related auth.user:1");

    if verbose {
        println!();
        println!("  Files created:");
        println!("     .papertrail/config.toml   Trail configuration");
        println!("     .papertrail/trail.db      Entries and targets (SQLite)");
    }
}
