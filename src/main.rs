mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, KindsAction};
use papertrail::config::app_config::AppConfig;

fn main() {
    let args = Cli::parse();
    cli::context::init(args.dir.as_deref());
    init_tracing(args.verbose);

    let result = match &args.command {
        Commands::Init { kinds } => cli::commands::init::execute(kinds, args.verbose),
        Commands::Record {
            event_type,
            message,
            data,
            at,
            targets,
            external_key,
        } => cli::commands::record::execute(cli::commands::record::RecordArgs {
            event_type,
            message,
            data: data.as_deref(),
            at: at.as_deref(),
            targets,
            external_key: external_key.as_deref(),
        }),
        Commands::Log {
            event_type,
            type_prefix,
            related,
            related_as,
            since,
            until,
            contains,
            last,
            json,
        } => cli::commands::log::execute(cli::commands::log::LogArgs {
            event_type: event_type.as_deref(),
            type_prefix: type_prefix.as_deref(),
            related,
            related_as,
            since: since.as_deref(),
            until: until.as_deref(),
            contains: contains.as_deref(),
            last: *last,
            json: *json,
        }),
        Commands::Show { id } => cli::commands::show::execute(*id),
        Commands::Assign {
            id,
            name,
            reference,
            no_replace,
        } => cli::commands::assign::execute(*id, name, reference, *no_replace),
        Commands::Retarget { old, new, entries } => {
            cli::commands::retarget::execute(old, new, entries)
        }
        Commands::Kinds { action } => match action {
            None | Some(KindsAction::List) => cli::commands::kinds::list(),
            Some(KindsAction::Add { name }) => cli::commands::kinds::add(name),
        },
    };

    if let Err(e) = result {
        cli::output::error(&format!("Error: {e}"));
        std::process::exit(1);
    }
}

/// Logs go to stderr. The filter comes from `PAPERTRAIL_LOG`, then
/// `[logging] filter` in the config, then `info` with `-v` or `warn`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("PAPERTRAIL_LOG").unwrap_or_else(|_| {
        let configured = AppConfig::load(cli::context::trail_dir())
            .ok()
            .and_then(|c| c.log_filter().map(str::to_string));
        let fallback = if verbose { "info" } else { "warn" };
        EnvFilter::try_new(configured.as_deref().unwrap_or(fallback))
            .unwrap_or_else(|_| EnvFilter::new(fallback))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
