use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default trail directory, relative to the working directory.
pub const DEFAULT_DIR: &str = ".papertrail";

static TRAIL_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the global trail directory path.
/// If `custom` is provided, uses that path; otherwise defaults to `.papertrail`.
pub fn init(custom: Option<&str>) {
    let dir = custom
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIR));
    let _ = TRAIL_DIR.set(dir);
}

/// Get the current trail directory path.
pub fn trail_dir() -> &'static Path {
    TRAIL_DIR
        .get()
        .map(|p| p.as_path())
        .unwrap_or(Path::new(DEFAULT_DIR))
}
