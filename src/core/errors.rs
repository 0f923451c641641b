use crate::core::models::entry::EntryId;

/// All domain errors for papertrail.
///
/// Each variant provides enough context to diagnose the issue
/// without needing a debugger.
#[derive(Debug, thiserror::Error)]
pub enum TrailError {
    #[error(
        "Entry {entry_id} already has a target named '{relation_name}'\n\n  \
         Solutions:\n    \
         → Assign again in replace mode to overwrite it\n    \
         → Choose another relation name"
    )]
    DuplicateTarget {
        entry_id: EntryId,
        relation_name: String,
    },

    #[error(
        "Entity kind '{kind}' is not registered\n\n  \
         Register the kind with the trail's kind registry before using it\n  \
         as a target (CLI: add it to [kinds] names in .papertrail/config.toml)."
    )]
    UnregisteredKind { kind: String },

    #[error("Type '{type_name}' is not registered as an entity kind")]
    UnregisteredType { type_name: &'static str },

    #[error("Conflicting entity kind registration: {detail}")]
    KindConflict { detail: String },

    #[error("Entry {id} not found")]
    EntryNotFound { id: EntryId },

    #[error(
        "Invalid entity reference: '{input}'\n\n  \
         Expected format: kind:id (e.g. auth.user:42)"
    )]
    InvalidReference { input: String },

    #[error("Invalid input: {detail}")]
    InvalidInput { detail: String },

    #[error("Storage failure: {detail}")]
    StorageFailure { detail: String },

    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error(
        "This trail uses format version {project_version}, but this build \
         only supports up to version {supported_version}.\n\n  \
         Update papertrail to read it."
    )]
    FormatVersionTooNew {
        project_version: u32,
        supported_version: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrailError>;
