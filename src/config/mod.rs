// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! Configuration module

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::ControllerSettings;
use crate::error::ConfigError;
use crate::escalation::EscalationConfig;
use crate::ingest::MqttConfig;
use crate::sources::SourceDefinition;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Location label included in every alert
    pub location: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Monitoring state used when no persisted state exists yet
    pub initial_monitoring: bool,

    /// Overview publication
    pub overview: OverviewConfig,

    /// Escalation channels and protocol toggle
    pub escalation: EscalationConfig,

    /// MQTT connection for readings, status and alerts
    pub mqtt: MqttConfig,

    /// Journal database
    pub database: DatabaseConfig,

    /// Monitored sources, in display order
    pub sources: Vec<SourceDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: String::new(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            initial_monitoring: false,
            overview: OverviewConfig::default(),
            escalation: EscalationConfig::default(),
            mqtt: MqttConfig::default(),
            database: DatabaseConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Run the same checks a reload would
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller_settings().validate()
    }

    /// Controller view of this configuration
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings::from_config(self)
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("tamperwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Overview configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewConfig {
    /// Publish the per-source overview, not only the OK/Alarm status
    pub enabled: bool,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Enable the journal
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Escalation runs kept in the journal
    pub journal_retention: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/tamperwatch.db"),
            journal_retention: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::{ChannelKind, ChannelTarget};
    use crate::sources::SourceId;

    const SAMPLE: &str = r#"
location = "Holiday home"
initial_monitoring = true

[escalation]
protocol_enabled = true
channel_timeout_ms = 5000

[escalation.notification]
enabled = true
target = { kind = "webhook", url = "https://push.example.org/alert" }

[escalation.siren]
enabled = true
target = { kind = "script", command = "/usr/local/bin/siren", args = ["on"] }

[escalation.light]
enabled = false

[[sources]]
id = 12345
name = "Sabotage"
parent = "Front door contact"

[[sources]]
id = 23456
name = "Sabotage"
enabled = false
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.location, "Holiday home");
        assert!(config.initial_monitoring);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].id, SourceId(12345));
        assert!(!config.sources[1].enabled);
        assert_eq!(config.escalation.channel_timeout_ms, 5000);
        assert_eq!(
            config.escalation.channel(ChannelKind::Siren).target,
            ChannelTarget::Script {
                command: "/usr/local/bin/siren".into(),
                args: vec!["on".into()],
            }
        );
        assert!(!config.escalation.call.enabled);
        assert!(config.overview.enabled);
    }

    #[test]
    fn test_duplicate_sources_rejected() {
        let content = r#"
[[sources]]
id = 1
name = "a"

[[sources]]
id = 1
name = "b"
"#;
        assert!(matches!(
            Config::from_toml(content),
            Err(ConfigError::DuplicateSource(SourceId(1)))
        ));
    }

    #[test]
    fn test_enabled_channel_without_target_rejected() {
        let content = r#"
[escalation.call]
enabled = true
"#;
        assert!(matches!(
            Config::from_toml(content),
            Err(ConfigError::InvalidChannel { channel: ChannelKind::Call, .. })
        ));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(created, loaded);
    }

    #[test]
    fn test_save_and_load_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_toml(SAMPLE).unwrap();
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }
}
