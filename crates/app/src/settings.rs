//! Handles settings for the application. Configuration is read from
//! `settings.toml` (optional) and from `ECONOMY__*` environment variables,
//! e.g. `ECONOMY__DATABASE__URL=memory`.
use config::{Config, ConfigError, Environment, File};
use engine::{CacheSettings, EconomySettings, store::DEFAULT_COPY_BATCH};
use serde::Deserialize;

/// Value of `database.url` selecting the process-local store.
pub const MEMORY_URL: &str = "memory";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Database {
    /// sea-orm connection string, or `memory`.
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: "sqlite:./economy.db?mode=rwc".to_string(),
        }
    }
}

/// One-shot import of every account from another backend, performed at
/// startup when the configured database is still empty.
#[derive(Debug, Deserialize)]
pub struct Migration {
    pub source_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_COPY_BATCH
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub economy: EconomySettings,
    pub cache: CacheSettings,
    pub migration: Option<Migration>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("settings").required(false))
            .add_source(
                Environment::with_prefix("ECONOMY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
