//! Reads the sections of the service configuration the admin tool needs, from
//! the same sources as the service: the settings file (optional) and
//! `ECONOMY__*` environment variables.
use config::{Config, ConfigBuilder, ConfigError, Environment, File, builder::DefaultState};
use engine::EconomySettings;
use serde::Deserialize;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./economy.db?mode=rwc";

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Database {
    pub url: String,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: Database,
    pub economy: EconomySettings,
}

impl Settings {
    /// `path` is a file name without extension, as for the service.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name(path).required(false))
                .add_source(
                    Environment::with_prefix("ECONOMY")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;
    use engine::Coins;

    use super::*;

    fn parse(toml: &str) -> Settings {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Settings::from_builder(builder).unwrap()
    }

    #[test]
    fn economy_section_overrides_defaults() {
        let settings = parse(
            r#"
            [database]
            url = "sqlite::memory:"

            [economy]
            max_liquid = 1000

            [cache]
            flush_interval_seconds = 60
            "#,
        );

        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.economy.max_liquid, Coins::whole(1000));
        assert_eq!(
            settings.economy.max_vault,
            EconomySettings::default().max_vault
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let settings = parse("");

        assert_eq!(settings.database.url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.economy, EconomySettings::default());
    }
}
