use papertrail::config::app_config::AppConfig;
use papertrail::core::errors::Result;

use crate::cli::{context, output};

/// Execute `papertrail kinds` / `papertrail kinds list`.
pub fn list() -> Result<()> {
    let config = AppConfig::load(context::trail_dir())?;
    let kinds = config.kind_names();

    if kinds.is_empty() {
        output::header("papertrail kinds");
        output::warning("No entity kinds registered");
        println!("  Run 'papertrail kinds add <kind>' to register one.");
        return Ok(());
    }

    output::header(&format!("papertrail kinds ({})", kinds.len()));
    for kind in kinds {
        println!("  {kind}");
    }
    Ok(())
}

/// Execute `papertrail kinds add <name>`.
pub fn add(name: &str) -> Result<()> {
    let trail_dir = context::trail_dir();
    let mut config = AppConfig::load(trail_dir)?;

    if config.add_kind(name)? {
        config.save(trail_dir)?;
        output::success(&format!("Registered kind {name}"));
    } else {
        output::warning(&format!("Kind {name} is already registered"));
    }
    Ok(())
}
