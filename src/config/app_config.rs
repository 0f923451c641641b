use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adapters::listeners::tracing_listener::TracingListener;
use crate::adapters::stores::memory_store::MemoryStore;
use crate::adapters::stores::sqlite_store::SqliteStore;
use crate::core::errors::{Result, TrailError};
use crate::core::services::kind_registry::KindRegistry;
use crate::core::services::trail::Trail;
use crate::core::traits::entry_store::EntryStore;

/// Name of the config file inside the trail directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Current format version supported by this build of papertrail.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// A trail whose store was picked at runtime from `[store] backend`.
pub type ConfiguredTrail = Trail<Box<dyn EntryStore>>;

/// Top-level papertrail configuration read from `.papertrail/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub papertrail: PapertrailSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<KindsSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<NotifySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSection>,
}

impl AppConfig {
    /// Defaults written by `papertrail init`.
    pub fn new(kinds: Vec<String>) -> Self {
        Self {
            papertrail: PapertrailSection {
                version: env!("CARGO_PKG_VERSION").to_string(),
                format_version: CURRENT_FORMAT_VERSION,
            },
            store: StoreSection::default(),
            kinds: Some(KindsSection { names: kinds }),
            notify: Some(NotifySection { log_recorded: true }),
            logging: None,
        }
    }

    /// Load the configuration from `<trail_dir>/config.toml`.
    ///
    /// After parsing, validates the database file name and kind names so a
    /// tampered config cannot point the store outside the trail directory.
    pub fn load(trail_dir: &Path) -> Result<Self> {
        let config_path = trail_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(TrailError::InvalidConfig {
                detail: format!(
                    "{} not found. Run 'papertrail init' first.",
                    config_path.display()
                ),
            });
        }
        let content = std::fs::read_to_string(&config_path)?;
        Self::parse(&content)
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| TrailError::InvalidConfig {
            detail: format!("Failed to parse {CONFIG_FILE}: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        // Check format version compatibility
        if self.papertrail.format_version > CURRENT_FORMAT_VERSION {
            return Err(TrailError::FormatVersionTooNew {
                project_version: self.papertrail.format_version,
                supported_version: CURRENT_FORMAT_VERSION,
            });
        }

        validate_simple_filename(&self.store.database, "store database")?;

        for name in self.kind_names() {
            validate_kind_name(name)?;
        }
        Ok(())
    }

    /// Write the configuration to `<trail_dir>/config.toml`.
    pub fn save(&self, trail_dir: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| TrailError::InvalidConfig {
            detail: format!("Failed to serialize {CONFIG_FILE}: {e}"),
        })?;
        std::fs::write(trail_dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    pub fn kind_names(&self) -> &[String] {
        self.kinds.as_ref().map(|k| k.names.as_slice()).unwrap_or_default()
    }

    /// Add a kind unless it is already listed. Returns whether it was added.
    pub fn add_kind(&mut self, name: &str) -> Result<bool> {
        validate_kind_name(name)?;
        let kinds = self.kinds.get_or_insert_with(KindsSection::default);
        if kinds.names.iter().any(|k| k == name) {
            return Ok(false);
        }
        kinds.names.push(name.to_string());
        Ok(true)
    }

    pub fn log_recorded(&self) -> bool {
        self.notify.as_ref().is_some_and(|n| n.log_recorded)
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.filter.as_deref())
    }

    /// Registry with every configured kind, all without lookups.
    pub fn kind_registry(&self) -> Result<KindRegistry> {
        let mut registry = KindRegistry::new();
        for name in self.kind_names() {
            registry.register_kind(name.as_str())?;
        }
        Ok(registry)
    }

    /// Open the configured store.
    pub fn open_store(&self, trail_dir: &Path) -> Result<Box<dyn EntryStore>> {
        let store: Box<dyn EntryStore> = match self.store.backend {
            StoreBackend::Sqlite => {
                Box::new(SqliteStore::open(&trail_dir.join(&self.store.database))?)
            }
            StoreBackend::Memory => Box::new(MemoryStore::new()),
        };
        Ok(store)
    }

    /// Build a ready-to-use trail: configured store, kinds and listeners.
    pub fn open_trail(&self, trail_dir: &Path) -> Result<ConfiguredTrail> {
        let trail = Trail::new(self.open_store(trail_dir)?, self.kind_registry()?);
        if self.log_recorded() {
            trail.subscribe(std::sync::Arc::new(TracingListener::new().with_target_detail()));
        }
        Ok(trail)
    }
}

/// The `[papertrail]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PapertrailSection {
    pub version: String,
    /// Format version for backward compatibility. Defaults to 1 if missing.
    #[serde(default = "default_format_version")]
    pub format_version: u32,
}

fn default_format_version() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Nothing survives the process; mostly useful for dry runs.
    Memory,
}

/// The `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database: default_database(),
        }
    }
}

fn default_database() -> String {
    "trail.db".to_string()
}

/// The `[kinds]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindsSection {
    #[serde(default)]
    pub names: Vec<String>,
}

/// The `[notify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifySection {
    #[serde(default)]
    pub log_recorded: bool,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    pub filter: Option<String>,
}

/// Reject anything that is not a plain file name.
pub fn validate_simple_filename(name: &str, what: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(TrailError::InvalidConfig {
            detail: format!("Invalid {what} name '{name}': must be a plain file name"),
        });
    }
    Ok(())
}

/// Kind names appear in `kind:id` text, so they cannot contain `:`.
pub fn validate_kind_name(name: &str) -> Result<()> {
    if name.trim().is_empty() || name.contains(':') || name.trim() != name {
        return Err(TrailError::InvalidConfig {
            detail: format!(
                "Invalid kind name '{name}': must be non-empty, without ':' or surrounding spaces"
            ),
        });
    }
    Ok(())
}
