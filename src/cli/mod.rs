pub mod commands;
pub mod context;
pub mod output;

use clap::{Parser, Subcommand};

/// Record what happened, to whom, and find it again.
#[derive(Parser, Debug)]
#[command(name = "papertrail", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Trail directory (default: .papertrail)
    #[arg(long, global = true, env = "PAPERTRAIL_DIR")]
    pub dir: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a trail in the current project
    Init {
        /// Entity kind to register. Repeat for several: --kind auth.user --kind auth.group
        #[arg(long = "kind")]
        kinds: Vec<String>,
    },

    /// Record an event
    Record {
        /// Event type, e.g. user-created
        event_type: String,
        /// Human-readable summary
        message: String,
        /// Arbitrary JSON payload
        #[arg(long)]
        data: Option<String>,
        /// Event time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Target as name=kind:id. Repeat for several; an empty name is allowed
        #[arg(long = "target")]
        targets: Vec<String>,
        /// Idempotency key, unique per event type
        #[arg(long)]
        external_key: Option<String>,
    },

    /// Show recorded events, newest first
    Log {
        /// Filter by exact event type
        #[arg(long = "type")]
        event_type: Option<String>,
        /// Filter by event type prefix
        #[arg(long)]
        type_prefix: Option<String>,
        /// Only entries related to kind:id. Repeat to require several
        #[arg(long)]
        related: Vec<String>,
        /// Only entries related to kind:id under a name, as name=kind:id
        #[arg(long)]
        related_as: Vec<String>,
        /// Entries at or after this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        since: Option<String>,
        /// Entries before this date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        until: Option<String>,
        /// Only entries whose message contains this text
        #[arg(long)]
        contains: Option<String>,
        /// Show last N entries
        #[arg(long)]
        last: Option<usize>,
        /// One JSON object per line
        #[arg(long)]
        json: bool,
    },

    /// Show one entry with its targets
    Show {
        /// Entry id
        id: u64,
    },

    /// Add or replace a target on an entry
    Assign {
        /// Entry id
        id: u64,
        /// Relation name
        name: String,
        /// Target as kind:id
        reference: String,
        /// Fail instead of replacing an existing target
        #[arg(long)]
        no_replace: bool,
    },

    /// Point targets at another entity, e.g. after a merge
    Retarget {
        /// Current target as kind:id
        old: String,
        /// New target as kind:id
        new: String,
        /// Only rewrite this entry. Repeat for several
        #[arg(long = "entry")]
        entries: Vec<u64>,
    },

    /// Manage registered entity kinds
    Kinds {
        #[command(subcommand)]
        action: Option<KindsAction>,
    },
}

#[derive(Subcommand, Debug)]
pub enum KindsAction {
    /// List registered kinds
    List,
    /// Register a new kind
    Add {
        /// Kind name, e.g. auth.user
        name: String,
    },
}
