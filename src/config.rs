//! Persistent configuration model and defaults.

use std::path::PathBuf;

use log::warn;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Library database location.
    pub database: DatabaseConfig,
    #[serde(default)]
    /// Online cover-art lookup behavior.
    pub art: ArtConfig,
}

/// Library database preferences.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    /// Explicit database file path; the platform data dir when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Cover-art lookup preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ArtConfig {
    #[serde(default = "default_true")]
    pub online_art_enabled: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ArtConfig {
    fn default() -> Self {
        Self {
            online_art_enabled: true,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    7
}

fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|path| path.join("discograph").join("config.toml"))
}

impl Config {
    /// Loads the persisted configuration, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = config_file_path() else {
            return Self::default();
        };
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(error) => {
                warn!(
                    "Config: failed to parse {}, using defaults: {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let Some(path) = config_file_path() else {
            return Err("No config directory available".to_string());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| format!("Failed to create config directory: {error}"))?;
        }
        let serialized = toml::to_string_pretty(self)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(&path, serialized)
            .map_err(|error| format!("Failed to write config: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{ArtConfig, Config};

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).expect("serialization succeeds");
        let restored: Config = toml::from_str(&serialized).expect("deserialization succeeds");
        assert_eq!(config, restored);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("[art]\nonline_art_enabled = false\n")
            .expect("partial config parses");
        assert!(!config.art.online_art_enabled);
        assert_eq!(
            config.art.connect_timeout_secs,
            ArtConfig::default().connect_timeout_secs
        );
        assert_eq!(config.database.path, None);
    }
}
